pub mod message;
pub mod pov;
pub mod room;
pub mod user;

pub use message::MessageRepository;
pub use pov::PovRepository;
pub use room::RoomRepository;
pub use user::UserRepository;
