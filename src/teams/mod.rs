//! Team formation
//!
//! Splits a full roster into two equal teams by MMR balancing, a captains
//! draft, or a caller-supplied partition. Every mode is a pure function of its
//! inputs so a match can be replayed exactly.

pub mod draft;
pub mod formation;

pub use draft::{DraftProgress, DraftState};
pub use formation::{team_mmr, FormationRequest, TeamFormationEngine};
