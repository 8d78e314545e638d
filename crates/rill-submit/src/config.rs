use rill_merge::MergeStrategyKind;
use rill_types::LabelId;

/// An approval label defined by a project, mapping the label to the footer
/// tag used when composing merged commit messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelType {
    pub name: String,
}

impl LabelType {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The footer tag for approvals of this label. The code-review and
    /// verification labels have conventional tags; other labels use their
    /// own display name.
    pub fn footer_tag(&self) -> &str {
        if self.name.eq_ignore_ascii_case("Code-Review") {
            "Reviewed-by"
        } else if self.name.eq_ignore_ascii_case("Verified") {
            "Tested-by"
        } else {
            &self.name
        }
    }
}

/// Per-project integration configuration (read-only here).
#[derive(Clone, Debug)]
pub struct ProjectConfig {
    /// Whether file contents may be merged line by line.
    pub content_merge: bool,
    /// Whether cherry-picked commits get their author date forced to the
    /// committer's date.
    pub match_author_to_committer_date: bool,
    /// Label definitions for this project.
    pub label_types: Vec<LabelType>,
}

impl ProjectConfig {
    /// Look up a label definition by id, case-insensitively.
    pub fn label(&self, id: &LabelId) -> Option<&LabelType> {
        self.label_types
            .iter()
            .find(|lt| lt.name.eq_ignore_ascii_case(id.as_str()))
    }

    /// Resolve the merge strategy for this project under the given
    /// server-wide configuration.
    pub fn strategy(&self, engine: &EngineConfig) -> MergeStrategyKind {
        MergeStrategyKind::for_project(self.content_merge, engine.use_recursive_merge)
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            content_merge: true,
            match_author_to_committer_date: false,
            label_types: vec![LabelType::new("Code-Review"), LabelType::new("Verified")],
        }
    }
}

/// Server-wide integration configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Whether content merges use the recursive strategy. Defaults to true.
    pub use_recursive_merge: bool,
    /// Base URL for `Reviewed-on` footers, e.g.
    /// `https://review.example.com/`. No footer is added when absent.
    pub canonical_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            use_recursive_merge: true,
            canonical_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_strategy_is_recursive() {
        let project = ProjectConfig::default();
        let engine = EngineConfig::default();
        assert_eq!(project.strategy(&engine), MergeStrategyKind::Recursive);
    }

    #[test]
    fn content_merge_disabled_selects_two_way() {
        let project = ProjectConfig {
            content_merge: false,
            ..ProjectConfig::default()
        };
        assert_eq!(
            project.strategy(&EngineConfig::default()),
            MergeStrategyKind::SimpleTwoWay
        );
    }

    #[test]
    fn legacy_resolve_when_recursion_disabled() {
        let engine = EngineConfig {
            use_recursive_merge: false,
            ..EngineConfig::default()
        };
        assert_eq!(
            ProjectConfig::default().strategy(&engine),
            MergeStrategyKind::Resolve
        );
    }

    #[test]
    fn label_lookup_is_case_insensitive() {
        let project = ProjectConfig::default();
        assert!(project.label(&LabelId::new("code-review")).is_some());
        assert!(project.label(&LabelId::new("Nonesuch")).is_none());
    }

    #[test]
    fn footer_tags() {
        assert_eq!(LabelType::new("Code-Review").footer_tag(), "Reviewed-by");
        assert_eq!(LabelType::new("Verified").footer_tag(), "Tested-by");
        assert_eq!(LabelType::new("QA-Approved").footer_tag(), "QA-Approved");
    }
}
