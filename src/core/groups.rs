use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use crate::core::filters::{readable_fields, ReadableFields};
use crate::core::matcher::validate_min_score;
use crate::core::scoring::score_fields;
use crate::error::CoreError;
use crate::models::{Algorithm, FormedGroup, Group, GroupMatch, Profile, ProfileId};

/// Largest group `form_groups` will build
pub const MAX_FORMED_GROUP_SIZE: usize = 50;

/// Tag set a group is scored with.
///
/// Declared tags win; otherwise the union of member tags, counting only members
/// `viewer` is allowed to see.
pub fn aggregate_tags(
    group: &Group,
    members: &HashMap<ProfileId, Profile>,
    viewer: ProfileId,
) -> BTreeSet<String> {
    if !group.tags.is_empty() {
        return group.tags.clone();
    }

    group
        .member_ids
        .iter()
        .filter_map(|id| members.get(id))
        .filter_map(|member| readable_fields(member, viewer))
        .flat_map(|fields| fields.tags.iter().cloned())
        .collect()
}

/// Rank `groups` for `subject` using the profile scoring rules.
///
/// Groups the subject already belongs to are skipped. `members` must hold the
/// member profiles referenced by the groups; missing ids are ignored.
pub fn recommend_groups(
    subject: &Profile,
    groups: &[Group],
    members: &HashMap<ProfileId, Profile>,
    algorithm: Algorithm,
    min_score: f64,
) -> Result<Vec<GroupMatch>, CoreError> {
    validate_min_score(min_score)?;

    let Some(subject_fields) = readable_fields(subject, subject.id) else {
        return Ok(Vec::new());
    };

    let mut recommendations: Vec<GroupMatch> = groups
        .iter()
        .filter(|group| !group.member_ids.contains(&subject.id))
        .filter_map(|group| {
            let tags = aggregate_tags(group, members, subject.id);
            let group_fields = ReadableFields {
                tags: &tags,
                preferences: Some(&group.preferences),
            };

            let breakdown = score_fields(&subject_fields, &group_fields, algorithm);
            if breakdown.score < min_score {
                return None;
            }

            Some(GroupMatch {
                subject_id: subject.id,
                group_id: group.id,
                group_name: group.name.clone(),
                score: breakdown.score,
                algorithm,
                matched_tags: breakdown.matched_tags,
                matched_preferences: breakdown.matched_preferences,
                member_count: group.member_ids.len(),
            })
        })
        .collect();

    recommendations.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.group_id.cmp(&b.group_id))
    });

    tracing::debug!(
        "Recommended {} of {} groups for subject {} ({})",
        recommendations.len(),
        groups.len(),
        subject.id,
        algorithm
    );

    Ok(recommendations)
}

/// Groups proposed by `form_groups` plus the pool members left over
#[derive(Debug, Clone, Default)]
pub struct GroupFormation {
    pub groups: Vec<FormedGroup>,
    pub unassigned: Vec<ProfileId>,
}

/// Symmetric affinity of two profiles, each read as the other may see it.
///
/// `None` when either is hidden from the other, so no score is ever computed
/// across a privacy boundary. Otherwise the mean of both directional scores.
pub fn affinity(a: &Profile, b: &Profile, algorithm: Algorithm) -> Option<f64> {
    let a_seen_by_b = readable_fields(a, b.id)?;
    let b_seen_by_a = readable_fields(b, a.id)?;
    let a_self = readable_fields(a, a.id)?;
    let b_self = readable_fields(b, b.id)?;

    let forward = score_fields(&a_self, &b_seen_by_a, algorithm).score;
    let backward = score_fields(&b_self, &a_seen_by_b, algorithm).score;
    Some((forward + backward) / 2.0)
}

/// Split `pool` into new groups of `min_size..=max_size` members.
///
/// # Stages
/// 1. Pairwise affinity for every pair; pairs hidden from each other get none
/// 2. Seed with the free profile of highest total affinity (lowest id on ties)
/// 3. Grow by the free profile with the best mean affinity to the members,
///    which must be positive, at least `min_score`, and defined for every member
/// 4. Keep the group if it reached `min_size`; otherwise the seed stops seeding
///
/// Groups come back in formation order. Nothing is stored.
pub fn form_groups(
    pool: &[Profile],
    algorithm: Algorithm,
    min_size: usize,
    max_size: usize,
    min_score: f64,
) -> Result<GroupFormation, CoreError> {
    validate_min_score(min_score)?;
    if min_size < 2 || min_size > max_size || max_size > MAX_FORMED_GROUP_SIZE {
        return Err(CoreError::Validation(format!(
            "group sizes must satisfy 2 <= min_size <= max_size <= {}, got {}..{}",
            MAX_FORMED_GROUP_SIZE, min_size, max_size
        )));
    }

    let mut profiles: Vec<&Profile> = pool.iter().collect();
    profiles.sort_by_key(|p| p.id);
    profiles.dedup_by_key(|p| p.id);
    let n = profiles.len();

    let mut affinities = vec![vec![None; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let value = affinity(profiles[i], profiles[j], algorithm);
            affinities[i][j] = value;
            affinities[j][i] = value;
        }
    }

    let mut free: BTreeSet<usize> = (0..n).collect();
    let mut spent_seeds: BTreeSet<usize> = BTreeSet::new();
    let mut formation = GroupFormation::default();

    while free.len() >= min_size {
        let total = |i: usize| -> f64 {
            free.iter()
                .filter(|&&j| j != i)
                .filter_map(|&j| affinities[i][j])
                .sum()
        };

        // Lower index is the lower id, so it wins ties
        let Some(seed) = free
            .iter()
            .copied()
            .filter(|i| !spent_seeds.contains(i))
            .max_by(|&a, &b| {
                total(a)
                    .partial_cmp(&total(b))
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| b.cmp(&a))
            })
        else {
            break;
        };

        let mut members = vec![seed];
        while members.len() < max_size {
            let next = free
                .iter()
                .copied()
                .filter(|i| !members.contains(i))
                .filter_map(|i| {
                    let mut sum = 0.0;
                    for &m in &members {
                        sum += affinities[i][m]?;
                    }
                    let mean = sum / members.len() as f64;
                    (mean > 0.0 && mean >= min_score).then_some((i, mean))
                })
                .max_by(|a, b| {
                    a.1.partial_cmp(&b.1)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| b.0.cmp(&a.0))
                });

            match next {
                Some((i, _)) => members.push(i),
                None => break,
            }
        }

        if members.len() < min_size {
            spent_seeds.insert(seed);
            continue;
        }

        for m in &members {
            free.remove(m);
        }
        members.sort_unstable();
        formation
            .groups
            .push(build_formed_group(&profiles, &affinities, &members, algorithm));
    }

    formation.unassigned = free.iter().map(|&i| profiles[i].id).collect();

    tracing::debug!(
        "Formed {} groups from {} profiles ({} unassigned, {})",
        formation.groups.len(),
        n,
        formation.unassigned.len(),
        algorithm
    );

    Ok(formation)
}

fn build_formed_group(
    profiles: &[&Profile],
    affinities: &[Vec<Option<f64>>],
    members: &[usize],
    algorithm: Algorithm,
) -> FormedGroup {
    let mut sum = 0.0;
    let mut pairs = 0usize;
    for (k, &i) in members.iter().enumerate() {
        for &j in &members[k + 1..] {
            sum += affinities[i][j].unwrap_or(0.0);
            pairs += 1;
        }
    }

    let mut shared: Option<BTreeSet<String>> = None;
    for &i in members {
        let tags = &profiles[i].tags;
        shared = Some(match shared {
            None => tags.clone(),
            Some(acc) => acc.intersection(tags).cloned().collect(),
        });
    }

    FormedGroup {
        member_ids: members.iter().map(|&i| profiles[i].id).collect(),
        score: if pairs == 0 { 0.0 } else { sum / pairs as f64 },
        algorithm,
        shared_tags: shared.unwrap_or_default().into_iter().collect(),
    }
}
