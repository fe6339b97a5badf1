//! Route path constants.

/// POST /register: create an account and send a verification email.
pub const POST_REGISTER: &str = "/register";
/// POST /login: password login, sets session and refresh cookies.
pub const POST_LOGIN: &str = "/login";
/// POST /forgot-password: request a reset email (always 200).
pub const POST_FORGOT_PASSWORD: &str = "/forgot-password";
/// POST /resend-verification: re-send the verification email (always 200).
pub const POST_RESEND_VERIFICATION: &str = "/resend-verification";
/// POST /reset-password: consume a reset token.
pub const POST_RESET_PASSWORD: &str = "/reset-password";
/// POST /verify-email: consume an email verification token.
pub const POST_VERIFY_EMAIL: &str = "/verify-email";
/// POST /refresh: rotate the refresh-token cookie.
pub const POST_REFRESH: &str = "/refresh";
/// POST /logout
pub const POST_LOGOUT: &str = "/logout";
/// GET /session: identity, system role and project roles of the caller.
pub const GET_SESSION: &str = "/session";
/// GET /sessions
pub const GET_SESSIONS: &str = "/sessions";
/// DELETE /sessions/{id}
pub const DELETE_SESSIONS_ID: &str = "/sessions/{id}";
/// PUT and DELETE /admin/users/{id}/system-role
pub const ADMIN_USERS_ID_SYSTEM_ROLE: &str = "/admin/users/{id}/system-role";
/// GET /admin/audit
pub const GET_ADMIN_AUDIT: &str = "/admin/audit";
/// POST /admin/test-email
pub const POST_ADMIN_TEST_EMAIL: &str = "/admin/test-email";
/// PUT /projects/{project_id}/members/{user_id}
pub const PUT_PROJECTS_ID_MEMBERS_USER_ID: &str = "/projects/{project_id}/members/{user_id}";
