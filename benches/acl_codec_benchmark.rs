//! ACL codec and evaluation benchmarks.
//!
//! # Benchmarks
//!
//! - `serialize`: encodes an ACL with a few hundred owners
//! - `deserialize`: parses the same ACL back
//! - `check_exact_access`: evaluates a hit and a miss against it
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench acl_codec_benchmark
//! ```

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use sre_acl::{AccessCandidate, AccessLevel, AccessRole, Acl};

/// Builds an ACL with `owners` agents, a handful of teams and a public read.
fn setup_acl(owners: usize) -> Acl {
    let mut acl = Acl::new();
    for i in 0..owners {
        let level = if i % 3 == 0 {
            AccessLevel::Write
        } else {
            AccessLevel::Read
        };
        acl.add_access(AccessRole::Agent, &format!("agent-{i}"), level);
    }
    for team in ["ops", "web|edge", "data:lake"] {
        acl.add_access(AccessRole::Team, team, AccessLevel::Read);
    }
    acl.add_public_access(AccessLevel::Read);
    acl
}

fn bench_serialize(c: &mut Criterion) {
    let acl = setup_acl(256);
    c.bench_function("serialize", |b| b.iter(|| black_box(&acl).serialize()));
}

fn bench_deserialize(c: &mut Criterion) {
    let raw = setup_acl(256).serialize();
    c.bench_function("deserialize", |b| {
        b.iter(|| Acl::deserialize(black_box(&raw)).unwrap());
    });
}

fn bench_check(c: &mut Criterion) {
    let acl = setup_acl(256);
    let hit = AccessCandidate::agent("agent-99")
        .unwrap()
        .write_request("r1")
        .unwrap();
    let miss = AccessCandidate::agent("agent-9999")
        .unwrap()
        .read_request("r1")
        .unwrap();
    c.bench_function("check_exact_access", |b| {
        b.iter(|| {
            black_box(acl.check_exact_access(black_box(&hit)));
            black_box(acl.check_exact_access(black_box(&miss)));
        });
    });
}

criterion_group!(benches, bench_serialize, bench_deserialize, bench_check);
criterion_main!(benches);
