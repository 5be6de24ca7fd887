//! Cloud storage adapters

mod google_drive;

pub use google_drive::GoogleDriveUploader;
