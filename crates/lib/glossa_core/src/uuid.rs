// Helper for generating UUIDv7 (timestamp-sortable UUIDs)
//
// Sessions, refresh tokens, verification tokens, audit rows and login
// attempts are listed by creation time, so their ids are UUIDv7 minted
// app-side. User ids stay random v4 from PG's gen_random_uuid().

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}
