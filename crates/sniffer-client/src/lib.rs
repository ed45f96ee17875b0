pub mod profiles;
pub mod transport;

pub use profiles::BrowserProfile;
pub use transport::ReqwestTransport;
