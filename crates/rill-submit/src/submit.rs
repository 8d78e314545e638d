use rill_graph::RevWalk;
use rill_merge::MergeStrategyKind;
use rill_store::BufferedInserter;
use rill_types::{Identity, ObjectId};
use tracing::info;

use crate::candidate::{BranchName, BranchTip, CandidateSet};
use crate::config::ProjectConfig;
use crate::error::SubmitResult;
use crate::sorter::IntegrationSorter;
use crate::status::{CommitStatus, StatusLedger};
use crate::writer::CommitWriter;

/// What one pass produced: the final tip and every commit's status.
#[derive(Debug)]
pub struct PassOutcome {
    pub tip: BranchTip,
    pub ledger: StatusLedger,
}

/// Drives one batch integration pass end to end.
///
/// Candidates are filtered and ordered, the first fast-forwardable commit
/// advances the tip without a merge commit, the rest merge one by one
/// (recording failure statuses instead of aborting), clean merges are
/// swept, and buffered objects flush exactly once at the end. A typed
/// error aborts before the flush, leaving the store untouched.
///
/// The caller owns serialization: if the branch ref moved underneath the
/// pass, the whole pass must re-run against the freshly read tip.
pub struct SubmitPass<'a> {
    inserter: &'a BufferedInserter<'a>,
    project: &'a ProjectConfig,
    strategy: MergeStrategyKind,
    identity: Identity,
    dest: BranchName,
}

impl<'a> SubmitPass<'a> {
    pub fn new(
        inserter: &'a BufferedInserter<'a>,
        project: &'a ProjectConfig,
        strategy: MergeStrategyKind,
        identity: Identity,
        dest: BranchName,
    ) -> Self {
        Self {
            inserter,
            project,
            strategy,
            identity,
            dest,
        }
    }

    pub fn run(
        &self,
        initial_tip: Option<ObjectId>,
        candidates: &CandidateSet,
    ) -> SubmitResult<PassOutcome> {
        let sorter = IntegrationSorter::new(self.inserter, candidates, self.strategy);
        let writer = CommitWriter::new(self.inserter, self.project, self.strategy);

        let mut tip = BranchTip::new(initial_tip);
        let mut ledger = StatusLedger::new();

        let sorted = sorter.sort(tip.current().as_ref(), &mut ledger)?;
        let mut queue = sorter.reduce_to_heads(&sorted)?;

        if let Some(ff) = sorter.first_fast_forward(tip.current().as_ref(), &mut queue)? {
            info!(tip = %ff.abbrev(), "fast-forwarded");
            tip.advance(ff);
        }

        for n in queue {
            // A candidate the tip already contains is not merged again.
            if let Some(current) = tip.current() {
                let mut walk = RevWalk::new(self.inserter);
                if walk.is_merged_into(&n, &current)? {
                    ledger.mark(n, CommitStatus::AlreadyMerged);
                    continue;
                }
            }
            writer.merge_one_commit(
                &self.identity,
                &self.identity,
                &mut tip,
                &n,
                candidates,
                &self.dest,
                &mut ledger,
            )?;
        }

        let accepted: Vec<ObjectId> = tip.initial().into_iter().collect();
        writer.mark_clean_merges(tip.current().as_ref(), &accepted, candidates, &mut ledger)?;

        self.inserter.flush()?;
        Ok(PassOutcome { tip, ledger })
    }
}
