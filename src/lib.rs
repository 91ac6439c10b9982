pub mod config;
pub mod digest;
pub mod download;
pub mod error;
pub mod fileset;
pub mod model;
pub mod overlap;
pub mod sync;
pub mod uri;

pub use error::DtmgrError;
