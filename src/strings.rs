pub const TAG_NOT_FOUND: &str = "No tag exists with that id";
pub const TABLES_CREATED: &str = "Created missing tables";
pub const NO_IMAGES: &str = "No images on this page";
pub const NO_HISTORY: &str = "No history on this page";
