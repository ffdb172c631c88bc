// Criterion benchmarks for Universa Match

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::{BTreeMap, BTreeSet};
use universa_match::core::{preference_score, tag_score, Matcher};
use universa_match::models::{normalize_tags, Algorithm, PreferenceMap, PrivacyLevel, Profile, ProfileId};
use universa_match::privacy::{PiiCategory, Sanitizer, SanitizerConfig};

const TAG_POOL: [&str; 12] = [
    "music", "hiking", "coding", "chess", "cooking", "travel", "running", "film", "books",
    "climbing", "gardening", "photography",
];

fn create_candidate(id: usize) -> Profile {
    let tags: Vec<&str> = (0..4).map(|k| TAG_POOL[(id * 7 + k * 3) % TAG_POOL.len()]).collect();

    let mut preferences = PreferenceMap::new();
    let mut music = BTreeMap::new();
    music.insert("jazz".to_string(), (id % 5) as f64 / 4.0);
    music.insert("rock".to_string(), (id % 3) as f64 / 2.0);
    preferences.insert("music".to_string(), music);

    let now = Utc::now();
    Profile {
        id: ProfileId(id as u64),
        display_name: format!("member {}", id),
        description: String::new(),
        tags: normalize_tags(tags),
        preferences,
        privacy_level: if id % 10 == 0 { PrivacyLevel::Private } else { PrivacyLevel::Public },
        availability: Default::default(),
        trusted_viewers: BTreeSet::new(),
        public_key: None,
        key_version: 0,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

fn bench_tag_score(c: &mut Criterion) {
    let a = create_candidate(1);
    let b = create_candidate(2);

    c.bench_function("tag_score", |bench| {
        bench.iter(|| tag_score(black_box(&a.tags), black_box(&b.tags)));
    });

    c.bench_function("preference_score", |bench| {
        bench.iter(|| preference_score(black_box(&a.preferences), black_box(&b.preferences)));
    });
}

fn bench_ranking(c: &mut Criterion) {
    let matcher = Matcher::default();
    let subject = create_candidate(999_999);

    let mut group = c.benchmark_group("ranking");

    for candidate_count in [10, 100, 1000, 10000].iter() {
        let candidates: Vec<Profile> = (0..*candidate_count).map(create_candidate).collect();

        for algorithm in [Algorithm::Tag, Algorithm::Preference] {
            group.bench_with_input(
                BenchmarkId::new(format!("rank_{}", algorithm), candidate_count),
                candidate_count,
                |b, _| {
                    b.iter(|| {
                        matcher.rank(
                            black_box(&subject),
                            black_box(&candidates),
                            algorithm,
                            black_box(0.1),
                        )
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_sanitize(c: &mut Criterion) {
    let sanitizer = Sanitizer::new(SanitizerConfig::default());
    let categories = PiiCategory::all();

    let short = "Contact Jane Doe at jane@example.com or 555-123-4567.";
    let long = "I love hiking and jazz, and I volunteer at the library on weekends. ".repeat(100)
        + "Ask Dr. Smith about 221 Baker Street.";

    c.bench_function("sanitize_short", |b| {
        b.iter(|| sanitizer.sanitize_patterns(black_box(short), &categories))
    });

    c.bench_function("sanitize_long", |b| {
        b.iter(|| sanitizer.sanitize_patterns(black_box(&long), &categories))
    });
}

criterion_group!(benches, bench_tag_score, bench_ranking, bench_sanitize);

criterion_main!(benches);
