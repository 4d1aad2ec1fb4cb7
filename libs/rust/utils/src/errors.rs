//db
pub const DATABASE_CONNECTION_FAILED: &str = "Failed to connect to database";
pub const DATABASE_MIGRATION_FAILED: &str = "Failed to run database migrations";
pub const DB_TRANSACTION_BEGIN_FAILED: &str = "Failed to begin database transaction";
pub const DB_TRANSACTION_COMMIT_FAILED: &str = "Failed to commit database transaction";

//agent
pub const POLL_NOT_FOUND_ERROR: &str = "Poll not found after forced sync";
pub const SOCIAL_PROFILE_NOT_FOUND_ERROR: &str = "No social client registered for profile";
