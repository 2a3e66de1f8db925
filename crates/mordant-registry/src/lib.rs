mod error;
mod policy;
mod registry;

pub use error::{Rejection, RegistryError};
pub use policy::UrlPolicy;
pub use registry::Registry;
