pub mod id;
pub mod message;
pub mod pov;
pub mod room;
pub mod user;

pub use id::{generate_id, MessageId, PovId, RoomId, UserId};
pub use message::Message;
pub use pov::{IngressKind, Pov};
pub use room::{generate_join_code, slugify, CreateRoomRequest, Room};
pub use user::User;
