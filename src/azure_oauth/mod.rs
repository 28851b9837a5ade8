pub mod credential;
mod endpoints;

pub use credential::AzureCredential;
