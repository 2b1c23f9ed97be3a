use std::collections::BTreeMap;

use crate::error::PrepError;

/// A cleavage rule, expressed as the residues an enzyme cuts after and the
/// residues that suppress the cut when they follow the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnzymeRule {
    pub cut_after: String,
    pub cut_before: String,
}

impl EnzymeRule {
    pub fn new(cut_after: &str, cut_before: &str) -> Self {
        Self {
            cut_after: cut_after.to_string(),
            cut_before: cut_before.to_string(),
        }
    }

    /// Renders the rule in the `[after]|[before]` cut-site syntax shared by
    /// crux and Kojak.
    pub fn cut_site_pair(&self) -> String {
        format!("[{}]|[{}]", self.cut_after, self.cut_before)
    }
}

/// Immutable table of named variable modifications (cross-linkers included),
/// each mapped to engine-specific configuration fragments.
#[derive(Debug, Clone, Default)]
pub struct ModificationRegistry {
    entries: BTreeMap<String, BTreeMap<String, String>>,
}

impl ModificationRegistry {
    pub fn from_entries<I, F>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, F)>,
        F: IntoIterator<Item = (String, String)>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, fragments)| (name, fragments.into_iter().collect()))
                .collect(),
        }
    }

    /// The modifications the original trainer ships with: BS3 and its
    /// deuterated variants, as Kojak cross-link/mono-link blocks.
    pub fn builtin() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            "BS3".to_string(),
            kojak_fragment(
                "cross_link = nK nK 138.0680742 BS3\n\
                 mono_link = nK 155.094629\n\
                 mono_link = nK 156.078644\n",
            ),
        );
        entries.insert(
            "BS3-d4".to_string(),
            kojak_fragment(
                "cross_link = nK nK 142.093187 BS3-d4\n\
                 mono_link = nK 159.119736\n\
                 mono_link = nK 160.103751\n",
            ),
        );
        entries.insert(
            "BS3-d12".to_string(),
            kojak_fragment(
                "cross_link = nK nK 150.14339515 BS3-d12\n\
                 mono_link = nK 167.16994995\n\
                 mono_link = nK 168.15396495\n",
            ),
        );
        Self { entries }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn fragment(&self, name: &str, engine: &str) -> Result<&str, PrepError> {
        let fragments = self.entries.get(name).ok_or_else(|| {
            PrepError::Configuration(format!("unknown modification: {name}"))
        })?;
        fragments
            .get(engine)
            .map(String::as_str)
            .ok_or_else(|| {
                PrepError::Configuration(format!(
                    "modification {name} has no fragment for engine {engine}"
                ))
            })
    }
}

/// Immutable table of named digestion enzymes. Suppressing digestion entirely
/// is not allowed, so an empty enzyme set is rejected upstream.
#[derive(Debug, Clone, Default)]
pub struct EnzymeRegistry {
    entries: BTreeMap<String, EnzymeRule>,
}

impl EnzymeRegistry {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, EnzymeRule)>,
    {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn builtin() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("Trypsin".to_string(), EnzymeRule::new("KR", ""));
        entries.insert("GluC".to_string(), EnzymeRule::new("DE", ""));
        entries.insert("Chymotrypsin".to_string(), EnzymeRule::new("FWY", ""));
        Self { entries }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn rule(&self, name: &str) -> Result<&EnzymeRule, PrepError> {
        self.entries
            .get(name)
            .ok_or_else(|| PrepError::Configuration(format!("unknown enzyme: {name}")))
    }
}

fn kojak_fragment(block: &str) -> BTreeMap<String, String> {
    let mut fragments = BTreeMap::new();
    fragments.insert("kojak".to_string(), block.to_string());
    fragments
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::error::PrepError;

    #[test]
    fn builtin_modifications() {
        let registry = ModificationRegistry::builtin();
        assert!(registry.contains("BS3"));
        assert!(registry.contains("BS3-d12"));

        let fragment = registry.fragment("BS3", "kojak").unwrap();
        assert!(fragment.starts_with("cross_link = nK nK 138.0680742 BS3"));
    }

    #[test]
    fn unknown_modification_is_configuration_error() {
        let registry = ModificationRegistry::builtin();
        let err = registry.fragment("DSSO", "kojak").unwrap_err();
        assert_matches!(err, PrepError::Configuration(_));
    }

    #[test]
    fn unknown_engine_is_configuration_error() {
        let registry = ModificationRegistry::builtin();
        let err = registry.fragment("BS3", "comet").unwrap_err();
        assert_matches!(err, PrepError::Configuration(_));
    }

    #[test]
    fn builtin_enzymes() {
        let registry = EnzymeRegistry::builtin();
        let rule = registry.rule("Trypsin").unwrap();
        assert_eq!(rule.cut_after, "KR");
        assert_eq!(rule.cut_site_pair(), "[KR]|[]");

        let err = registry.rule("LysC").unwrap_err();
        assert_matches!(err, PrepError::Configuration(_));
    }
}
