mod bucket;
mod slug;

pub use bucket::{assign_bucket, Bucket};
pub use slug::slugify;
