pub mod fs;
pub mod registry;
pub mod traits;

#[cfg(feature = "adapter-http")]
pub mod http;

#[cfg(any(feature = "test-fixtures", test))]
pub mod mock;
