/// Groups and events
///
/// - Group directory with admin/member/outsider roles
/// - Events scheduled inside a group and their RSVP answers

pub mod access;
pub mod directory;
pub mod events;
pub mod types;

pub use access::{group_access, require_group_access};
pub use directory::GroupDirectory;
pub use events::EventBook;
pub use types::{
    Event, EventResponse, EventSummary, Group, GroupAccess, GroupPrivacy, GroupView, NewEvent, NewGroup, Role,
    RsvpResponse,
};
