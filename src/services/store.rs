use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::matches_candidate_filter;
use crate::error::CoreError;
use crate::models::{
    normalize_preferences, normalize_tags, CandidateFilter, Group, GroupId, NewGroup, NewProfile,
    Profile, ProfileId, ProfilePatch,
};
use crate::privacy::{PiiCategory, Sanitizer};

/// What the store does with text that still carries high-confidence PII
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PiiPolicy {
    /// Store the redacted form
    #[default]
    Redact,
    /// Fail with `UnsanitizedInput` unless the caller sets `allow_redaction`
    Reject,
}

type Record<T> = Arc<RwLock<T>>;

/// In-memory arena of profiles and groups.
///
/// Each record sits behind its own lock so writers to one id never block
/// readers of another. Text is sanitized before any lock is taken; the
/// record lock is only held for the final check-and-apply.
pub struct ProfileStore {
    profiles: RwLock<HashMap<ProfileId, Record<Profile>>>,
    groups: RwLock<HashMap<GroupId, Record<Group>>>,
    tombstones: RwLock<HashSet<ProfileId>>,
    next_profile_id: AtomicU64,
    next_group_id: AtomicU64,
    sanitizer: Arc<Sanitizer>,
    policy: PiiPolicy,
}

impl ProfileStore {
    pub fn new(sanitizer: Arc<Sanitizer>, policy: PiiPolicy) -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            tombstones: RwLock::new(HashSet::new()),
            next_profile_id: AtomicU64::new(1),
            next_group_id: AtomicU64::new(1),
            sanitizer,
            policy,
        }
    }

    /// Categories applied to short labels; person names are allowed there
    fn label_categories() -> BTreeSet<PiiCategory> {
        let mut categories = PiiCategory::all();
        categories.remove(&PiiCategory::Name);
        categories
    }

    /// Sanitize one text field according to the store policy.
    ///
    /// Returns the text that may be persisted. The result is re-scanned and
    /// must be free of high-confidence spans.
    async fn clean_text(
        &self,
        field: &str,
        text: &str,
        categories: &BTreeSet<PiiCategory>,
        allow_redaction: bool,
    ) -> Result<String, CoreError> {
        let threshold = self.sanitizer.threshold();
        let report = self.sanitizer.sanitize(text, categories).await?;
        let flagged = report.high_confidence_spans(threshold);

        if !flagged.is_empty() {
            match (self.policy, allow_redaction) {
                (PiiPolicy::Reject, false) => {
                    tracing::info!(
                        field,
                        spans = flagged.len(),
                        "Rejecting field with unresolved PII"
                    );
                    return Err(CoreError::UnsanitizedInput {
                        field: field.to_string(),
                        spans: flagged,
                    });
                }
                (PiiPolicy::Reject, true) => {
                    tracing::warn!(
                        field,
                        spans = flagged.len(),
                        "PII override: storing redacted field"
                    );
                }
                (PiiPolicy::Redact, _) => {
                    tracing::debug!(field, spans = flagged.len(), "Redacted field before storing");
                }
            }
        }

        if report.degraded {
            tracing::warn!(field, warnings = ?report.warnings, "Field sanitized in degraded mode");
        }

        let residual = self
            .sanitizer
            .sanitize_patterns(&report.redacted_text, categories)?
            .high_confidence_spans(threshold);
        if !residual.is_empty() {
            return Err(CoreError::UnsanitizedInput {
                field: field.to_string(),
                spans: residual,
            });
        }

        Ok(report.redacted_text)
    }

    async fn clean_label(
        &self,
        field: &str,
        text: &str,
        allow_redaction: bool,
    ) -> Result<String, CoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CoreError::Validation(format!("{} must not be empty", field)));
        }
        self.clean_text(field, text, &Self::label_categories(), allow_redaction)
            .await
    }

    async fn clean_description(&self, text: &str, allow_redaction: bool) -> Result<String, CoreError> {
        self.clean_text("description", text, &PiiCategory::all(), allow_redaction)
            .await
    }

    fn profile_record(&self, id: ProfileId) -> Result<Record<Profile>, CoreError> {
        self.profiles
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::profile_not_found(id))
    }

    fn group_record(&self, id: GroupId) -> Result<Record<Group>, CoreError> {
        self.groups
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::group_not_found(id))
    }

    /// Every id must name a live profile.
    ///
    /// Callers that go on to record the ids in a group hold `tombstones` across
    /// this check and the write, so a concurrent delete either fails the check
    /// or strips the group after the write lands.
    fn ensure_live_profiles(
        &self,
        tombstones: &HashSet<ProfileId>,
        ids: &[ProfileId],
    ) -> Result<(), CoreError> {
        let profiles = self.profiles.read();
        match ids
            .iter()
            .find(|id| tombstones.contains(id) || !profiles.contains_key(id))
        {
            Some(missing) => Err(CoreError::profile_not_found(*missing)),
            None => Ok(()),
        }
    }

    /// Trusted viewers must already exist; ids are handed out in order, so
    /// trusting a future id would expose the profile to whoever registers next.
    fn check_trusted_viewers(&self, viewers: &[ProfileId]) -> Result<(), CoreError> {
        let tombstones = self.tombstones.read();
        let profiles = self.profiles.read();
        let unknown: Vec<String> = viewers
            .iter()
            .filter(|id| tombstones.contains(id) || !profiles.contains_key(id))
            .map(|id| id.to_string())
            .collect();

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "trusted viewers must be registered profiles, unknown: {}",
                unknown.join(", ")
            )))
        }
    }

    /// Sanitize and store a new profile
    pub async fn create_profile(&self, raw: NewProfile) -> Result<Profile, CoreError> {
        let display_name = self
            .clean_label("display_name", &raw.display_name, raw.allow_redaction)
            .await?;
        let description = self
            .clean_description(&raw.description, raw.allow_redaction)
            .await?;
        let preferences = normalize_preferences(raw.preferences)?;
        self.check_trusted_viewers(&raw.trusted_viewers)?;

        let id = ProfileId(self.next_profile_id.fetch_add(1, Ordering::SeqCst));
        let now = chrono::Utc::now();
        let profile = Profile {
            id,
            display_name,
            description,
            tags: normalize_tags(&raw.tags),
            preferences,
            privacy_level: raw.privacy_level,
            availability: raw.availability,
            trusted_viewers: raw.trusted_viewers.into_iter().collect(),
            public_key: None,
            key_version: 0,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        self.profiles
            .write()
            .insert(id, Arc::new(RwLock::new(profile.clone())));

        tracing::info!(
            "Created profile {} ({:?}, {} tags)",
            id,
            profile.privacy_level,
            profile.tags.len()
        );

        Ok(profile)
    }

    pub async fn get_profile(&self, id: ProfileId) -> Result<Profile, CoreError> {
        match self.profile_record(id) {
            Ok(record) => Ok(record.read().clone()),
            Err(e) => {
                if self.tombstones.read().contains(&id) {
                    tracing::debug!("Lookup of deleted profile {}", id);
                }
                Err(e)
            }
        }
    }

    /// Apply a partial update atomically.
    ///
    /// Changed text fields are sanitized first. The record is then locked once,
    /// the expected version checked, and every change applied together.
    pub async fn update_profile(
        &self,
        id: ProfileId,
        patch: ProfilePatch,
    ) -> Result<Profile, CoreError> {
        if patch.is_empty() {
            return Err(CoreError::Validation("update contains no fields".to_string()));
        }

        let record = self.profile_record(id)?;

        let display_name = match &patch.display_name {
            Some(name) => Some(
                self.clean_label("display_name", name, patch.allow_redaction)
                    .await?,
            ),
            None => None,
        };
        let description = match &patch.description {
            Some(text) => Some(self.clean_description(text, patch.allow_redaction).await?),
            None => None,
        };
        let preferences = patch.preferences.map(normalize_preferences).transpose()?;
        if let Some(viewers) = &patch.trusted_viewers {
            self.check_trusted_viewers(viewers)?;
        }

        let mut profile = record.write();

        if let Some(expected) = patch.expected_version {
            if profile.version != expected {
                return Err(CoreError::Conflict {
                    resource: format!("profile {}", id),
                    expected,
                    actual: profile.version,
                });
            }
        }

        if let Some(name) = display_name {
            profile.display_name = name;
        }
        if let Some(text) = description {
            profile.description = text;
        }
        if let Some(tags) = patch.tags {
            profile.tags = normalize_tags(&tags);
        }
        if let Some(preferences) = preferences {
            profile.preferences = preferences;
        }
        if let Some(level) = patch.privacy_level {
            profile.privacy_level = level;
        }
        if let Some(availability) = patch.availability {
            profile.availability = availability;
        }
        if let Some(viewers) = patch.trusted_viewers {
            profile.trusted_viewers = viewers.into_iter().collect();
        }
        profile.version += 1;
        profile.updated_at = chrono::Utc::now();

        tracing::info!("Updated profile {} to version {}", id, profile.version);

        Ok(profile.clone())
    }

    /// Remove a profile and leave a tombstone; the id is never issued again.
    ///
    /// The tombstone goes in before the groups are swept. Membership writers
    /// hold the tombstone set for reading, so any insert they make is either
    /// refused or already visible to the sweep.
    pub async fn delete_profile(&self, id: ProfileId) -> Result<(), CoreError> {
        let mut tombstones = self.tombstones.write();
        if self.profiles.write().remove(&id).is_none() {
            return Err(CoreError::profile_not_found(id));
        }
        tombstones.insert(id);
        drop(tombstones);

        let groups: Vec<Record<Group>> = self.groups.read().values().cloned().collect();
        for record in groups {
            let mut group = record.write();
            if group.member_ids.remove(&id) {
                group.version += 1;
                group.updated_at = chrono::Utc::now();
            }
        }

        tracing::info!("Deleted profile {}", id);
        Ok(())
    }

    pub fn is_tombstoned(&self, id: ProfileId) -> bool {
        self.tombstones.read().contains(&id)
    }

    /// Every profile, ordered by id
    pub async fn list_profiles(&self) -> Vec<Profile> {
        let records: Vec<Record<Profile>> = self.profiles.read().values().cloned().collect();
        let mut profiles: Vec<Profile> = records.iter().map(|r| r.read().clone()).collect();
        profiles.sort_by_key(|p| p.id);
        profiles
    }

    /// Profiles eligible for a candidate pool, ordered by id.
    ///
    /// PRIVATE profiles only appear when `filter.include_ids` names them.
    pub async fn list_candidates(&self, filter: &CandidateFilter) -> Vec<Profile> {
        let records: Vec<Record<Profile>> = match &filter.include_ids {
            Some(ids) => {
                let profiles = self.profiles.read();
                ids.iter().filter_map(|id| profiles.get(id).cloned()).collect()
            }
            None => self.profiles.read().values().cloned().collect(),
        };

        let mut candidates: Vec<Profile> = records
            .iter()
            .filter_map(|record| {
                let profile = record.read();
                matches_candidate_filter(&profile, filter).then(|| profile.clone())
            })
            .collect();
        candidates.sort_by_key(|p| p.id);
        candidates.dedup_by_key(|p| p.id);
        candidates
    }

    /// Profiles for the given ids; unknown ids are skipped
    pub async fn profiles_by_ids<'a, I>(&self, ids: I) -> HashMap<ProfileId, Profile>
    where
        I: IntoIterator<Item = &'a ProfileId>,
    {
        let profiles = self.profiles.read();
        ids.into_iter()
            .filter_map(|id| profiles.get(id).map(|r| (*id, r.read().clone())))
            .collect()
    }

    /// Sanitize and store a new group
    pub async fn create_group(&self, raw: NewGroup) -> Result<Group, CoreError> {
        let name = self
            .clean_label("name", &raw.name, raw.allow_redaction)
            .await?;
        let description = self
            .clean_description(&raw.description, raw.allow_redaction)
            .await?;
        let preferences = normalize_preferences(raw.preferences)?;

        // Lock order: tombstones, then profiles, then groups
        let tombstones = self.tombstones.read();
        self.ensure_live_profiles(&tombstones, &raw.member_ids)?;

        let id = GroupId(self.next_group_id.fetch_add(1, Ordering::SeqCst));
        let now = chrono::Utc::now();
        let group = Group {
            id,
            name,
            description,
            tags: normalize_tags(&raw.tags),
            preferences,
            member_ids: raw.member_ids.into_iter().collect(),
            version: 1,
            created_at: now,
            updated_at: now,
        };

        self.groups
            .write()
            .insert(id, Arc::new(RwLock::new(group.clone())));
        drop(tombstones);

        tracing::info!("Created group {} with {} members", id, group.member_ids.len());

        Ok(group)
    }

    pub async fn get_group(&self, id: GroupId) -> Result<Group, CoreError> {
        Ok(self.group_record(id)?.read().clone())
    }

    /// Add a profile to a group. Adding an existing member is a no-op.
    pub async fn add_member(
        &self,
        group_id: GroupId,
        profile_id: ProfileId,
    ) -> Result<Group, CoreError> {
        let record = self.group_record(group_id)?;

        let tombstones = self.tombstones.read();
        self.ensure_live_profiles(&tombstones, &[profile_id])?;

        let mut group = record.write();
        if group.member_ids.insert(profile_id) {
            group.version += 1;
            group.updated_at = chrono::Utc::now();
            tracing::info!("Added profile {} to group {}", profile_id, group_id);
        }

        Ok(group.clone())
    }

    /// Every group, ordered by id
    pub async fn list_groups(&self) -> Vec<Group> {
        let records: Vec<Record<Group>> = self.groups.read().values().cloned().collect();
        let mut groups: Vec<Group> = records.iter().map(|r| r.read().clone()).collect();
        groups.sort_by_key(|g| g.id);
        groups
    }

    /// Groups `profile_id` belongs to, ordered by id
    pub async fn groups_for(&self, profile_id: ProfileId) -> Result<Vec<Group>, CoreError> {
        self.profile_record(profile_id)?;

        let records: Vec<Record<Group>> = self.groups.read().values().cloned().collect();
        let mut groups: Vec<Group> = records
            .iter()
            .filter_map(|record| {
                let group = record.read();
                group.member_ids.contains(&profile_id).then(|| group.clone())
            })
            .collect();
        groups.sort_by_key(|g| g.id);
        Ok(groups)
    }

    /// Install a public key, atomically refusing to replace one unless `rotate` is set.
    ///
    /// Returns the new key version.
    pub async fn set_public_key(
        &self,
        id: ProfileId,
        public_key: String,
        rotate: bool,
    ) -> Result<u32, CoreError> {
        let record = self.profile_record(id)?;
        let mut profile = record.write();

        if profile.public_key.is_some() && !rotate {
            return Err(CoreError::KeyAlreadyExists(id));
        }

        profile.public_key = Some(public_key);
        profile.key_version += 1;
        profile.version += 1;
        profile.updated_at = chrono::Utc::now();

        Ok(profile.key_version)
    }
}
