//! Data models for agenda and social entities.
//!
//! All records are client-side projections of rows owned by the backend:
//!
//! - `Agenda`, `AgendaSection`, `AgendaElement`: the shared task lists
//! - `AgendaMember`, `AgendaEditor`: who can see and who can edit
//! - `CompletedElement`, `UrgentElement`: per-viewer annotations
//! - `Profile`, `ProfileComment`, `Reaction`, `UserCredit`: social data
//! - `AgendaBundle`, `ElementView`: view-ready shapes written to the cache

pub mod agenda;
pub mod profile;

pub use agenda::{
    compare_urgency, sort_by_urgency, Agenda, Annotation, AgendaBundle, AgendaComment, AgendaEditor,
    AgendaElement, AgendaMember, AgendaSection, CompletedElement, ElementView,
    SectionView, SectionWithElements, UrgentElement,
};
pub use profile::{Profile, ProfileComment, ProfileFeed, Reaction, UserCredit};
