//! Domain module - Core entities and collaborator seams
//!
//! Entities and value objects of the studbook registry, plus the traits
//! the crawling core talks to (record store, audit store, browser, session
//! and object storage).

pub mod horse;
pub mod pedigree;
pub mod report;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use horse::{Horse, HorseFields, HorseRef, HorseUpdate, LivingStatus, NewHorse, PedigreeEntry, Sex, TaprootRef};
pub use pedigree::{PedigreeNode, PedigreeTree};
pub use report::{NewReport, Outcome, Report};
pub use value_objects::{HorseId, StudbookId};
