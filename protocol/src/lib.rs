pub mod management;
pub mod status;
#[cfg(feature = "v1")]
pub mod v1;
