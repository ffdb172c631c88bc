// Core algorithm exports
pub mod filters;
pub mod groups;
pub mod matcher;
pub mod scoring;

pub use filters::{matches_candidate_filter, readable_fields, ReadableFields};
pub use groups::{affinity, aggregate_tags, form_groups, recommend_groups, GroupFormation};
pub use matcher::Matcher;
pub use scoring::{preference_score, score, score_fields, tag_score, ScoreBreakdown};
