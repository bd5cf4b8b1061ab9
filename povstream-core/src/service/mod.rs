pub mod chat;
pub mod ingress;
pub mod join_gate;
pub mod token;
pub mod whip;

pub use chat::{ChatEvent, ChatHub};
pub use ingress::{HttpIngressClient, IngressClient, IngressService, ProvisionedPov};
pub use join_gate::JoinGate;
pub use token::{SessionTokenIssuer, TokenRole};
pub use whip::{WhipAnswer, WhipClient, WhipRejection};
