//! Hash domain governance lock tests.
//!
//! Proves:
//! 1. The canonical domain set has the expected count
//! 2. All domain byte strings are unique
//! 3. All domains are null-terminated and follow `SIEVE::*::V1\0`
//! 4. No raw `SIEVE::` domain literals in production source outside `hash_domain.rs`
//! 5. No `deny_unknown_fields` in production source: persisted configs and
//!    snapshots must stay readable when fields are added

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use sieve_kernel::proof::hash_domain::HashDomain;

const PRODUCTION_DIRS: [&str; 3] = [
    concat!(env!("CARGO_MANIFEST_DIR"), "/../../kernel/src"),
    concat!(env!("CARGO_MANIFEST_DIR"), "/../../search/src"),
    concat!(env!("CARGO_MANIFEST_DIR"), "/../../harness/src"),
];

#[test]
fn hash_domain_canonical_set_count() {
    assert_eq!(
        HashDomain::ALL.len(),
        7,
        "expected 7 domain variants; if you added a new domain, update this count"
    );
}

#[test]
fn hash_domain_all_unique_bytes() {
    let mut seen = BTreeSet::new();
    for domain in HashDomain::ALL {
        assert!(seen.insert(domain.as_bytes()), "duplicate domain bytes: {domain}");
    }
}

#[test]
fn hash_domain_wire_format() {
    for domain in HashDomain::ALL {
        let bytes = domain.as_bytes();
        assert!(bytes.starts_with(b"SIEVE::"), "{domain} does not start with SIEVE::");
        assert!(bytes.ends_with(b"::V1\0"), "{domain} does not end with ::V1\\0");
        assert_eq!(
            bytes.iter().filter(|&&b| b == 0).count(),
            1,
            "{domain} has an interior null byte"
        );
    }
}

#[test]
fn no_raw_domain_literals_outside_authority() {
    let violations = scan_production("b\"SIEVE::", Some("hash_domain.rs"));
    assert!(
        violations.is_empty(),
        "raw SIEVE:: domain literals found outside hash_domain.rs:\n{}",
        violations.join("\n")
    );
}

#[test]
fn no_deny_unknown_fields_in_production() {
    let violations = scan_production("deny_unknown_fields", None);
    assert!(
        violations.is_empty(),
        "deny_unknown_fields found in production source:\n{}",
        violations.join("\n")
    );
}

#[test]
fn production_dirs_exist() {
    for dir in PRODUCTION_DIRS {
        assert!(Path::new(dir).is_dir(), "{dir} is not a directory");
    }
}

/// Non-test, non-comment lines containing `pattern`.
fn scan_production(pattern: &str, skip_file: Option<&str>) -> Vec<String> {
    let mut violations = Vec::new();
    for dir in PRODUCTION_DIRS {
        for path in walk(Path::new(dir)) {
            if path.extension().and_then(|e| e.to_str()) != Some("rs") {
                continue;
            }
            if skip_file.is_some() && path.file_name().and_then(|n| n.to_str()) == skip_file {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            for (line_no, line) in production_lines(&content) {
                if line.contains(pattern) {
                    violations.push(format!("  {}:{line_no}: {line}", path.display()));
                }
            }
        }
    }
    violations
}

/// Trimmed lines outside `#[cfg(test)]` blocks and comments, 1-based.
fn production_lines(content: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut brace_depth: usize = 0;
    let mut skip_depth: Option<usize> = None;
    let mut cfg_test_pending = false;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.contains("#[cfg(test)]") {
            cfg_test_pending = true;
            continue;
        }
        let opens = line.chars().filter(|&c| c == '{').count();
        let closes = line.chars().filter(|&c| c == '}').count();
        if cfg_test_pending && opens > 0 {
            skip_depth = Some(brace_depth);
            cfg_test_pending = false;
        }
        brace_depth = brace_depth.saturating_add(opens).saturating_sub(closes);

        if let Some(depth) = skip_depth {
            if brace_depth <= depth {
                skip_depth = None;
            }
            continue;
        }
        if trimmed.starts_with("//") {
            continue;
        }
        out.push((i + 1, trimmed));
    }
    out
}

fn walk(dir: &Path) -> Vec<PathBuf> {
    let mut results = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                results.extend(walk(&path));
            } else {
                results.push(path);
            }
        }
    }
    results
}
