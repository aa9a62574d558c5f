//! Module E (Briefing Store) and Module G (Briefing Generator): the
//! task-briefing schema, its typed store, and the generator that
//! populates a briefing from a task spec (spec §4.E, §4.G).

pub mod generator;
pub mod store;
pub mod types;

pub use generator::{BriefingGenerator, CandidateFile, GeneratorInputs, TaskSpec, TaskType};
pub use store::BriefingStore;
pub use types::{
    BriefingIndexEntry, BriefingStatus, ContentType, ContextPointer, Dependency, Deliverable,
    DeliverableType, Priority, RequiredStatus, Role, TaskBriefing,
};
