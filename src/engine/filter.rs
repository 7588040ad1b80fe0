//! Applicability: platform, machine and name-filter rules.
use std::collections::BTreeMap;

use crate::config::defaults::ResolvedStep;
use crate::config::step::Restriction;
use crate::platform::Os;

/// Prefix of filter terms that match a step's tags instead of its name.
const TAG_PREFIX: &str = "tag:";

/// Whether `step` should run on this host with these filters.
///
/// The platform, machine and name rules must all accept the step.
#[must_use]
pub fn is_applicable(
    step: &ResolvedStep,
    os: Os,
    machine_id: Option<&str>,
    aliases: &BTreeMap<String, String>,
    filters: &[String],
) -> bool {
    platform_matches(&step.platforms, os)
        && machine_matches(&step.machines, machine_id, aliases)
        && name_matches(step, filters)
}

/// `only` wins over `except`; an unset restriction accepts everything.
fn restriction_accepts<T>(restriction: &Restriction<T>, mut is_current: impl FnMut(&T) -> bool) -> bool {
    if let Some(only) = &restriction.only {
        return only.iter().any(&mut is_current);
    }
    if let Some(except) = &restriction.except {
        return !except.iter().any(&mut is_current);
    }
    true
}

/// Platform rule.
#[must_use]
pub fn platform_matches(restriction: &Restriction<Os>, os: Os) -> bool {
    restriction_accepts(restriction, |o| *o == os)
}

/// Machine rule: entries are resolved through `aliases`, unaliased entries
/// are compared literally. Without a machine id no entry matches.
#[must_use]
pub fn machine_matches(
    restriction: &Restriction<String>,
    machine_id: Option<&str>,
    aliases: &BTreeMap<String, String>,
) -> bool {
    restriction_accepts(restriction, |entry| {
        let resolved = aliases.get(entry).unwrap_or(entry);
        machine_id.is_some_and(|id| id == resolved.as_str())
    })
}

/// Name-filter rule.
///
/// Terms are positive unless prefixed with `!`. A step matching any negative
/// term is excluded. With at least one positive term the step must match one
/// of them; with only negative terms every other step is accepted.
#[must_use]
pub fn name_matches(step: &ResolvedStep, filters: &[String]) -> bool {
    let mut positives = Vec::new();
    let mut negatives = Vec::new();
    for term in filters {
        match term.strip_prefix('!') {
            Some(neg) => negatives.push(neg),
            None => positives.push(term.as_str()),
        }
    }

    if negatives.iter().any(|t| term_matches(step, t)) {
        return false;
    }
    positives.is_empty() || positives.iter().any(|t| term_matches(step, t))
}

fn term_matches(step: &ResolvedStep, term: &str) -> bool {
    match term.strip_prefix(TAG_PREFIX) {
        Some(tag) => step.tag_list().any(|t| t == tag),
        None => step.name.contains(term),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::defaults::{TypeDefaults, resolve};
    use crate::config::step::{StepDeclaration, StepType};

    fn step(name: &str) -> ResolvedStep {
        resolve(
            &StepDeclaration::new(name, "shell"),
            StepType::Shell,
            &TypeDefaults::default(),
        )
    }

    fn filters(terms: &[&str]) -> Vec<String> {
        terms.iter().map(|t| (*t).to_string()).collect()
    }

    #[test]
    fn empty_filters_accept_everything() {
        assert!(name_matches(&step("anything"), &[]));
    }

    #[test]
    fn positive_terms_match_by_substring() {
        let f = filters(&["rip", "fd"]);
        assert!(name_matches(&step("ripgrep"), &f));
        assert!(name_matches(&step("fd-find"), &f));
        assert!(!name_matches(&step("jq"), &f));
    }

    #[test]
    fn negative_term_always_excludes() {
        let f = filters(&["grep", "!ripgrep"]);
        assert!(!name_matches(&step("ripgrep"), &f));
        assert!(name_matches(&step("ugrep"), &f));
    }

    #[test]
    fn negative_only_filters_accept_all_non_matching_names() {
        let f = filters(&["!docker", "!slow"]);
        assert!(name_matches(&step("ripgrep"), &f));
        assert!(name_matches(&step("jq"), &f));
        assert!(!name_matches(&step("docker-desktop"), &f));
        assert!(!name_matches(&step("slow-build"), &f));
    }

    #[test]
    fn tag_terms_match_labels() {
        let mut decl = StepDeclaration::new("node", "brew");
        decl.tags = Some("dev  js".to_string());
        let s = resolve(&decl, StepType::Brew, &TypeDefaults::default());
        assert!(name_matches(&s, &filters(&["tag:js"])));
        assert!(!name_matches(&s, &filters(&["tag:j"])), "tags match exactly");
        assert!(!name_matches(&s, &filters(&["!tag:dev"])));
        assert!(name_matches(&s, &filters(&["!tag:rust"])));
    }

    #[test]
    fn platform_rules() {
        assert!(platform_matches(&Restriction::default(), Os::Windows));
        assert!(platform_matches(&Restriction::only(vec![Os::Linux]), Os::Linux));
        assert!(!platform_matches(&Restriction::only(vec![Os::Linux]), Os::MacOs));
        assert!(platform_matches(&Restriction::except(vec![Os::Windows]), Os::Linux));
        assert!(!platform_matches(&Restriction::except(vec![Os::Windows]), Os::Windows));
    }

    #[test]
    fn empty_only_never_matches() {
        assert!(!platform_matches(&Restriction::only(vec![]), Os::Linux));
        let aliases = BTreeMap::new();
        assert!(!machine_matches(&Restriction::only(vec![]), Some("abc"), &aliases));
    }

    #[test]
    fn only_wins_over_except() {
        let r = Restriction {
            only: Some(vec![Os::Linux]),
            except: Some(vec![Os::Linux]),
        };
        assert!(platform_matches(&r, Os::Linux));
        assert!(!platform_matches(&r, Os::MacOs));
    }

    #[test]
    fn machine_rules_resolve_aliases() {
        let aliases = BTreeMap::from([("laptop".to_string(), "abc".to_string())]);
        let only_laptop = Restriction::only(vec!["laptop".to_string()]);
        assert!(machine_matches(&only_laptop, Some("abc"), &aliases));
        assert!(!machine_matches(&only_laptop, Some("def"), &aliases));

        let literal = Restriction::only(vec!["def".to_string()]);
        assert!(machine_matches(&literal, Some("def"), &aliases));

        let not_laptop = Restriction::except(vec!["laptop".to_string()]);
        assert!(!machine_matches(&not_laptop, Some("abc"), &aliases));
        assert!(machine_matches(&not_laptop, Some("def"), &aliases));
    }

    #[test]
    fn unknown_machine_id() {
        let aliases = BTreeMap::new();
        assert!(!machine_matches(&Restriction::only(vec!["abc".to_string()]), None, &aliases));
        assert!(machine_matches(&Restriction::except(vec!["abc".to_string()]), None, &aliases));
        assert!(machine_matches(&Restriction::default(), None, &aliases));
    }

    #[test]
    fn all_rules_are_combined() {
        let mut decl = StepDeclaration::new("curl", "apt");
        decl.machines = Some(Restriction::only(vec!["abc".to_string()]));
        let s = resolve(&decl, StepType::Apt, &TypeDefaults::default());
        let aliases = BTreeMap::new();
        assert!(is_applicable(&s, Os::Linux, Some("abc"), &aliases, &[]));
        assert!(!is_applicable(&s, Os::MacOs, Some("abc"), &aliases, &[]));
        assert!(!is_applicable(&s, Os::Linux, Some("xyz"), &aliases, &[]));
        assert!(!is_applicable(&s, Os::Linux, Some("abc"), &aliases, &filters(&["git"])));
    }
}
