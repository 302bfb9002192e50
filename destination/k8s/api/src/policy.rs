pub mod server;
pub mod server_authorization;
pub mod serviceprofile;

pub use self::{
    server::{Port, ProxyProtocol, Server, ServerSpec},
    server_authorization::{ServerAuthorization, ServerAuthorizationSpec},
    serviceprofile::{ServiceProfile, ServiceProfileSpec},
};
