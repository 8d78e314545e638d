use rill_store::Commit;
use tracing::error;

use crate::approvals::{AccountDirectory, ApprovalsProvider};
use crate::candidate::{BranchName, Candidate};
use crate::config::{EngineConfig, ProjectConfig};
use crate::error::{IntegrateError, SubmitResult};

pub const CHANGE_ID_FOOTER: &str = "Change-Id";
pub const REVIEWED_ON_FOOTER: &str = "Reviewed-on";
pub const SIGNED_OFF_BY_FOOTER: &str = "Signed-off-by";

/// A trailing `Key: value` line of a commit message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Footer {
    pub key: String,
    pub value: String,
}

impl Footer {
    /// Footer keys compare case-insensitively; values compare exactly.
    pub fn matches(&self, key: &str, value: &str) -> bool {
        self.key.eq_ignore_ascii_case(key) && self.value == value
    }

    /// The email address in the value, if the value carries one
    /// (`Name <email>` or a bare address).
    pub fn email(&self) -> Option<&str> {
        if let (Some(open), Some(close)) = (self.value.find('<'), self.value.rfind('>')) {
            if open < close {
                return Some(&self.value[open + 1..close]);
            }
        }
        if self.value.contains('@') {
            return Some(self.value.trim());
        }
        None
    }
}

/// Parse the trailing footer block of a message: footer-shaped lines of
/// the last paragraph. A message without such lines has no footer block.
pub fn footer_lines(message: &str) -> Vec<Footer> {
    let trimmed = message.trim_end_matches('\n');
    if trimmed.is_empty() {
        return Vec::new();
    }
    let last_paragraph = trimmed.rsplit("\n\n").next().unwrap_or(trimmed);
    last_paragraph.lines().filter_map(parse_footer).collect()
}

fn parse_footer(line: &str) -> Option<Footer> {
    let (key, value) = line.split_once(':')?;
    let valid_key = !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-');
    let value = value.trim();
    if !valid_key || value.is_empty() {
        return None;
    }
    Some(Footer {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn contains(footers: &[Footer], key: &str, value: &str) -> bool {
    footers.iter().any(|f| f.matches(key, value))
}

fn is_signed_off_by(footers: &[Footer], email: &str) -> bool {
    footers
        .iter()
        .any(|f| f.key.eq_ignore_ascii_case(SIGNED_OFF_BY_FOOTER) && f.email() == Some(email))
}

/// A pluggable rewrite of the composed message, run after the built-in
/// footers are in place.
///
/// Modifiers run in registration order; each receives the current message
/// and must return a non-empty replacement. Returning an empty message is
/// a contract violation and fails the operation as a configuration error.
pub trait MessageModifier: Send + Sync {
    fn name(&self) -> &str;

    fn on_submit(
        &self,
        message: &str,
        original: &Commit,
        merge_tip: Option<&Commit>,
        dest: &BranchName,
    ) -> SubmitResult<String>;
}

/// Builds the message a change carries into the branch history.
pub struct MessageComposer<'a> {
    project: &'a ProjectConfig,
    engine: &'a EngineConfig,
    approvals: &'a dyn ApprovalsProvider,
    accounts: &'a dyn AccountDirectory,
    modifiers: Vec<Box<dyn MessageModifier>>,
}

impl<'a> MessageComposer<'a> {
    pub fn new(
        project: &'a ProjectConfig,
        engine: &'a EngineConfig,
        approvals: &'a dyn ApprovalsProvider,
        accounts: &'a dyn AccountDirectory,
    ) -> Self {
        Self {
            project,
            engine,
            approvals,
            accounts,
            modifiers: Vec::new(),
        }
    }

    /// Append a modifier to the chain.
    pub fn add_modifier(&mut self, modifier: Box<dyn MessageModifier>) -> &mut Self {
        self.modifiers.push(modifier);
        self
    }

    /// Compose the full message: normalized original, `Change-Id`,
    /// `Reviewed-on`, reviewer footers, then the modifier chain.
    pub fn compose(
        &self,
        original: &Commit,
        candidate: &Candidate,
        merge_tip: Option<&Commit>,
        dest: &BranchName,
    ) -> SubmitResult<String> {
        let mut message = self.detailed_message(original, candidate)?;

        for modifier in &self.modifiers {
            message = modifier.on_submit(&message, original, merge_tip, dest)?;
            if message.trim().is_empty() {
                return Err(IntegrateError::InvalidConfiguration(format!(
                    "message modifier {} returned an empty commit message",
                    modifier.name()
                )));
            }
        }
        Ok(message)
    }

    /// The built-in footer pass, without the modifier chain.
    fn detailed_message(&self, original: &Commit, candidate: &Candidate) -> SubmitResult<String> {
        let mut footers = footer_lines(&original.message);
        let mut message = if original.message.is_empty() {
            "<no commit message provided>".to_string()
        } else {
            original.message.clone()
        };

        // Exactly one trailing newline, and a blank line to open a footer
        // block if the message does not already end in one.
        while message.ends_with("\n\n") {
            message.pop();
        }
        if !message.ends_with('\n') {
            message.push('\n');
        }
        if footers.is_empty() {
            message.push('\n');
        }

        if !contains(&footers, CHANGE_ID_FOOTER, candidate.key.as_str()) {
            append_footer(&mut message, &mut footers, CHANGE_ID_FOOTER, candidate.key.as_str());
        }

        if let Some(base) = &self.engine.canonical_url {
            let url = format!("{base}{}", candidate.change());
            if !contains(&footers, REVIEWED_ON_FOOTER, &url) {
                append_footer(&mut message, &mut footers, REVIEWED_ON_FOOTER, &url);
            }
        }

        let approvals = match self.approvals.by_patch_set(&candidate.patch_set) {
            Ok(list) => list,
            Err(e) => {
                error!(patch_set = %candidate.patch_set, error = %e, "cannot read approvals");
                Vec::new()
            }
        };

        for approval in &approvals {
            if approval.value <= 0 || approval.is_submit {
                continue;
            }
            let Some(account) = self.accounts.account(approval.account) else {
                continue;
            };

            let mut ident = String::new();
            if let Some(name) = account.full_name.as_deref().filter(|n| !n.is_empty()) {
                ident.push_str(name);
            }
            if let Some(email) = account.preferred_email.as_deref().filter(|e| !e.is_empty()) {
                if is_signed_off_by(&footers, email) {
                    continue;
                }
                if !ident.is_empty() {
                    ident.push(' ');
                }
                ident.push('<');
                ident.push_str(email);
                ident.push('>');
            }
            if ident.is_empty() {
                // Nothing reasonable to describe the voter by.
                continue;
            }

            let tag = match self.project.label(&approval.label) {
                Some(label_type) => label_type.footer_tag(),
                None if approval.label.is_code_review() => "Reviewed-by",
                None if approval.label.is_verified() => "Tested-by",
                None => continue,
            };

            if !contains(&footers, tag, &ident) {
                append_footer(&mut message, &mut footers, tag, &ident);
            }
        }

        Ok(message)
    }
}

fn append_footer(message: &mut String, footers: &mut Vec<Footer>, key: &str, value: &str) {
    message.push_str(key);
    message.push_str(": ");
    message.push_str(value);
    message.push('\n');
    footers.push(Footer {
        key: key.to_string(),
        value: value.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use rill_store::Tree;
    use rill_types::{ChangeId, ChangeKey, Identity, LabelId, ObjectId, PatchSetId, Timestamp};

    use crate::approvals::{Account, AccountId, Approval};

    struct StaticApprovals(Vec<Approval>);

    impl ApprovalsProvider for StaticApprovals {
        fn by_patch_set(&self, _ps: &PatchSetId) -> SubmitResult<Vec<Approval>> {
            Ok(self.0.clone())
        }
    }

    struct FailingApprovals;

    impl ApprovalsProvider for FailingApprovals {
        fn by_patch_set(&self, _ps: &PatchSetId) -> SubmitResult<Vec<Approval>> {
            Err(IntegrateError::fault("approval backend down"))
        }
    }

    struct StaticAccounts(HashMap<u32, Account>);

    impl AccountDirectory for StaticAccounts {
        fn account(&self, id: AccountId) -> Option<Account> {
            self.0.get(&id.0).cloned()
        }
    }

    fn account(name: Option<&str>, email: Option<&str>) -> Account {
        Account {
            full_name: name.map(String::from),
            preferred_email: email.map(String::from),
        }
    }

    fn approval(account: u32, label: LabelId, value: i16) -> Approval {
        Approval {
            account: AccountId(account),
            label,
            value,
            granted: 1000,
            is_submit: false,
        }
    }

    fn commit(message: &str) -> Commit {
        let who = Identity::new("Author", "author@example.com", Timestamp::new(10, 0));
        Commit {
            tree: Tree::empty().id().unwrap(),
            parents: vec![],
            author: who.clone(),
            committer: who,
            message: message.to_string(),
        }
    }

    fn candidate() -> Candidate {
        Candidate::new(
            ObjectId::from_hash([1; 32]),
            ChangeKey::derive(b"message-tests"),
            PatchSetId::new(ChangeId(42), 2),
            None,
        )
    }

    fn composer_parts() -> (ProjectConfig, EngineConfig) {
        let project = ProjectConfig::default();
        let engine = EngineConfig {
            canonical_url: Some("https://review.example.com/".to_string()),
            ..EngineConfig::default()
        };
        (project, engine)
    }

    // ----------------------------------------------------------
    // Footer parsing
    // ----------------------------------------------------------

    #[test]
    fn footer_block_is_the_last_paragraph() {
        let footers = footer_lines("Subject\n\nBody text.\n\nChange-Id: Iabc\nReviewed-by: A <a@x>\n");
        assert_eq!(footers.len(), 2);
        assert_eq!(footers[0].key, "Change-Id");
        assert_eq!(footers[1].value, "A <a@x>");
    }

    #[test]
    fn plain_paragraph_is_not_a_footer_block() {
        assert!(footer_lines("Subject\n\nJust some prose here.\n").is_empty());
        assert!(footer_lines("").is_empty());
    }

    #[test]
    fn footer_keys_match_case_insensitively() {
        let footers = footer_lines("Subject\n\nchange-id: Iabc\n");
        assert!(contains(&footers, "Change-Id", "Iabc"));
        assert!(!contains(&footers, "Change-Id", "Iother"));
    }

    #[test]
    fn footer_email_extraction() {
        let f = Footer {
            key: "Signed-off-by".into(),
            value: "Some One <so@example.com>".into(),
        };
        assert_eq!(f.email(), Some("so@example.com"));
        let bare = Footer {
            key: "Signed-off-by".into(),
            value: "so@example.com".into(),
        };
        assert_eq!(bare.email(), Some("so@example.com"));
        let none = Footer {
            key: "Reviewed-by".into(),
            value: "Anonymous".into(),
        };
        assert_eq!(none.email(), None);
    }

    // ----------------------------------------------------------
    // Composition
    // ----------------------------------------------------------

    #[test]
    fn adds_change_id_and_reviewed_on() {
        let (project, engine) = composer_parts();
        let approvals = StaticApprovals(vec![]);
        let accounts = StaticAccounts(HashMap::new());
        let composer = MessageComposer::new(&project, &engine, &approvals, &accounts);

        let cand = candidate();
        let msg = composer
            .compose(&commit("Fix the widget\n"), &cand, None, &BranchName::new("main"))
            .unwrap();
        assert!(msg.starts_with("Fix the widget\n\n"));
        assert!(msg.contains(&format!("Change-Id: {}\n", cand.key)));
        assert!(msg.contains("Reviewed-on: https://review.example.com/42\n"));
    }

    #[test]
    fn composition_is_idempotent() {
        let (project, engine) = composer_parts();
        let approvals = StaticApprovals(vec![approval(1, LabelId::code_review(), 2)]);
        let accounts = StaticAccounts(HashMap::from([(
            1,
            account(Some("Rev Iewer"), Some("rev@example.com")),
        )]));
        let composer = MessageComposer::new(&project, &engine, &approvals, &accounts);

        let cand = candidate();
        let dest = BranchName::new("main");
        let first = composer
            .compose(&commit("Fix the widget\n"), &cand, None, &dest)
            .unwrap();
        let second = composer.compose(&commit(&first), &cand, None, &dest).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.matches("Change-Id:").count(), 1);
        assert_eq!(second.matches("Reviewed-on:").count(), 1);
        assert_eq!(second.matches("Reviewed-by:").count(), 1);
    }

    #[test]
    fn reviewer_and_tester_footers() {
        let (project, engine) = composer_parts();
        let approvals = StaticApprovals(vec![
            approval(1, LabelId::code_review(), 2),
            approval(2, LabelId::verified(), 1),
        ]);
        let accounts = StaticAccounts(HashMap::from([
            (1, account(Some("Rev Iewer"), Some("rev@example.com"))),
            (2, account(Some("Tes Ter"), Some("tes@example.com"))),
        ]));
        let composer = MessageComposer::new(&project, &engine, &approvals, &accounts);

        let msg = composer
            .compose(&commit("Subject\n"), &candidate(), None, &BranchName::new("main"))
            .unwrap();
        assert!(msg.contains("Reviewed-by: Rev Iewer <rev@example.com>\n"));
        assert!(msg.contains("Tested-by: Tes Ter <tes@example.com>\n"));
    }

    #[test]
    fn negative_and_submit_votes_are_skipped() {
        let (project, engine) = composer_parts();
        let mut submit = approval(3, LabelId::code_review(), 1);
        submit.is_submit = true;
        let approvals = StaticApprovals(vec![approval(1, LabelId::code_review(), -1), submit]);
        let accounts = StaticAccounts(HashMap::from([
            (1, account(Some("Nay"), Some("nay@example.com"))),
            (3, account(Some("Sub"), Some("sub@example.com"))),
        ]));
        let composer = MessageComposer::new(&project, &engine, &approvals, &accounts);

        let msg = composer
            .compose(&commit("Subject\n"), &candidate(), None, &BranchName::new("main"))
            .unwrap();
        assert!(!msg.contains("Reviewed-by:"));
    }

    #[test]
    fn voter_identity_degrades_gracefully() {
        let (project, engine) = composer_parts();
        let approvals = StaticApprovals(vec![
            approval(1, LabelId::code_review(), 2), // name only
            approval(2, LabelId::code_review(), 2), // email only
            approval(3, LabelId::code_review(), 2), // neither: skipped
        ]);
        let accounts = StaticAccounts(HashMap::from([
            (1, account(Some("Name Only"), None)),
            (2, account(None, Some("email@example.com"))),
            (3, account(None, None)),
        ]));
        let composer = MessageComposer::new(&project, &engine, &approvals, &accounts);

        let msg = composer
            .compose(&commit("Subject\n"), &candidate(), None, &BranchName::new("main"))
            .unwrap();
        assert!(msg.contains("Reviewed-by: Name Only\n"));
        assert!(msg.contains("Reviewed-by: <email@example.com>\n"));
        assert_eq!(msg.matches("Reviewed-by:").count(), 2);
    }

    #[test]
    fn signed_off_voters_are_not_repeated() {
        let (project, engine) = composer_parts();
        let approvals = StaticApprovals(vec![approval(1, LabelId::code_review(), 2)]);
        let accounts = StaticAccounts(HashMap::from([(
            1,
            account(Some("Dev"), Some("dev@example.com")),
        )]));
        let composer = MessageComposer::new(&project, &engine, &approvals, &accounts);

        let msg = composer
            .compose(
                &commit("Subject\n\nSigned-off-by: Dev <dev@example.com>\n"),
                &candidate(),
                None,
                &BranchName::new("main"),
            )
            .unwrap();
        assert!(!msg.contains("Reviewed-by:"));
    }

    #[test]
    fn unknown_label_is_skipped_and_custom_label_uses_its_name() {
        let (mut project, engine) = composer_parts();
        project.label_types.push(crate::config::LabelType::new("QA-Approved"));
        let approvals = StaticApprovals(vec![
            approval(1, LabelId::new("QA-Approved"), 1),
            approval(2, LabelId::new("Mystery"), 1),
        ]);
        let accounts = StaticAccounts(HashMap::from([
            (1, account(Some("Qa"), Some("qa@example.com"))),
            (2, account(Some("My"), Some("my@example.com"))),
        ]));
        let composer = MessageComposer::new(&project, &engine, &approvals, &accounts);

        let msg = composer
            .compose(&commit("Subject\n"), &candidate(), None, &BranchName::new("main"))
            .unwrap();
        assert!(msg.contains("QA-Approved: Qa <qa@example.com>\n"));
        assert!(!msg.contains("Mystery:"));
    }

    #[test]
    fn approval_failure_degrades_to_no_reviewer_footers() {
        let (project, engine) = composer_parts();
        let accounts = StaticAccounts(HashMap::new());
        let composer = MessageComposer::new(&project, &engine, &FailingApprovals, &accounts);

        let msg = composer
            .compose(&commit("Subject\n"), &candidate(), None, &BranchName::new("main"))
            .unwrap();
        assert!(msg.contains("Change-Id:"));
        assert!(!msg.contains("Reviewed-by:"));
    }

    // ----------------------------------------------------------
    // Modifier chain
    // ----------------------------------------------------------

    struct Suffixer(&'static str);

    impl MessageModifier for Suffixer {
        fn name(&self) -> &str {
            "suffixer"
        }

        fn on_submit(
            &self,
            message: &str,
            _original: &Commit,
            _merge_tip: Option<&Commit>,
            _dest: &BranchName,
        ) -> SubmitResult<String> {
            Ok(format!("{message}{}\n", self.0))
        }
    }

    struct Eraser;

    impl MessageModifier for Eraser {
        fn name(&self) -> &str {
            "eraser"
        }

        fn on_submit(
            &self,
            _message: &str,
            _original: &Commit,
            _merge_tip: Option<&Commit>,
            _dest: &BranchName,
        ) -> SubmitResult<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn modifiers_run_in_order() {
        let (project, engine) = composer_parts();
        let approvals = StaticApprovals(vec![]);
        let accounts = StaticAccounts(HashMap::new());
        let mut composer = MessageComposer::new(&project, &engine, &approvals, &accounts);
        composer.add_modifier(Box::new(Suffixer("first")));
        composer.add_modifier(Box::new(Suffixer("second")));

        let msg = composer
            .compose(&commit("Subject\n"), &candidate(), None, &BranchName::new("main"))
            .unwrap();
        assert!(msg.ends_with("first\nsecond\n"));
    }

    #[test]
    fn empty_modifier_result_is_a_configuration_error() {
        let (project, engine) = composer_parts();
        let approvals = StaticApprovals(vec![]);
        let accounts = StaticAccounts(HashMap::new());
        let mut composer = MessageComposer::new(&project, &engine, &approvals, &accounts);
        composer.add_modifier(Box::new(Eraser));

        let err = composer
            .compose(&commit("Subject\n"), &candidate(), None, &BranchName::new("main"))
            .unwrap_err();
        assert!(matches!(err, IntegrateError::InvalidConfiguration(_)));
    }
}
