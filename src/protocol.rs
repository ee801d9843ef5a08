use std::marker::PhantomData;

use log::{info, warn};
use rayon::prelude::*;

use crate::action::{Action, Outcome};
use crate::bb::BulletinBoard;
use crate::condition::{Condition, JointCondition};
use crate::error::TrusteeError;
use crate::position::{decryptor, mix_position, trustee_at_position};
use crate::trustee::Trustee;

/// A rule pairs a condition over the observed key set with the action
/// to dispatch when it holds. Rules are evaluated in priority order,
/// first match wins.
struct Rule {
    condition: JointCondition,
    action: Action,
}

impl Rule {
    fn new(condition: impl Into<JointCondition>, action: Action) -> Rule {
        Rule {
            condition: condition.into(),
            action,
        }
    }
}

/// Outcome of one driver cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    /// Actions that ran to completion.
    pub executed: u32,
    /// Error messages produced this cycle (already posted to the board
    /// where postable).
    pub errors: Vec<String>,
    /// Set when a global rule halted the cycle.
    pub stopped: Option<String>,
}

impl StepResult {
    fn stopped(message: String) -> StepResult {
        StepResult {
            executed: 0,
            errors: vec![],
            stopped: Some(message),
        }
    }

    fn idle() -> StepResult {
        StepResult {
            executed: 0,
            errors: vec![],
            stopped: None,
        }
    }
}

/// The cycle driver: sync the board, snapshot the key set, evaluate
/// global then per-item rules, dispatch the selected actions and write
/// per-cycle errors back to the board.
pub struct Protocol<B> {
    pub trustee: Trustee,
    phantom_b: PhantomData<B>,
}

impl<B: BulletinBoard + Sync> Protocol<B> {
    pub fn new(trustee: Trustee) -> Protocol<B> {
        Protocol {
            trustee,
            phantom_b: PhantomData,
        }
    }

    pub fn step(&self, board: &mut B) -> Result<StepResult, TrusteeError> {
        board.sync()?;
        let files = board.file_set();

        let cfg = board.get_config_opt().ok_or_else(|| {
            TrusteeError::Configuration("no parseable config on the board".to_string())
        })?;
        let self_pos = cfg.position_of(self.trustee.public_pem());
        if self_pos == 0 {
            return Err(TrusteeError::Configuration(
                "this trustee is not listed in the config".to_string(),
            ));
        }
        let n = cfg.trustee_count();

        // global rules, first match wins
        for rule in self.global_rules(n, self_pos) {
            if rule.condition.eval(&files) {
                return self.dispatch_global(rule.action, board, self_pos);
            }
        }

        // per-item rules, first match wins within each item
        let mut selected: Vec<Action> = Vec::new();
        for item in 1..=cfg.items {
            let rules = self.item_rules(item, n, self_pos);
            if let Some(rule) = rules.into_iter().find(|r| r.condition.eval(&files)) {
                selected.push(rule.action);
            }
        }

        if selected.is_empty() {
            return Ok(StepResult::idle());
        }
        info!("cycle selected {} actions: {:?}", selected.len(), selected);

        let all_pre_shuffle = selected
            .iter()
            .all(|a| matches!(a, Action::AddPreShuffleData(_)));

        let mut executed = 0;
        let mut errors: Vec<String> = Vec::new();
        let mut postable: Vec<String> = Vec::new();

        if all_pre_shuffle {
            // the offline phase is order-independent across items, and
            // dense enough that intra-cycle parallelism pays off
            let board_view: &B = board;
            let results: Vec<(Action, Result<(), TrusteeError>)> = selected
                .into_par_iter()
                .map(|action| {
                    let ret = match &action {
                        Action::AddPreShuffleData(item) => {
                            self.trustee.add_pre_shuffle_data(board_view, *item)
                        }
                        _ => unreachable!(),
                    };
                    (action, ret)
                })
                .collect();
            for (action, ret) in results {
                match ret {
                    Ok(()) => executed += 1,
                    Err(e) => collect_error(&action, e, &mut errors, &mut postable),
                }
            }
        } else {
            for action in selected {
                match self.trustee.execute(&action, board) {
                    Ok(Outcome::Stop(msg)) => return Ok(StepResult::stopped(msg)),
                    Ok(_) => executed += 1,
                    Err(e) => collect_error(&action, e, &mut errors, &mut postable),
                }
            }
        }

        if !postable.is_empty() {
            board.add_error(&postable.join("; "), self_pos)?;
        }

        Ok(StepResult {
            executed,
            errors,
            stopped: None,
        })
    }

    fn dispatch_global(
        &self,
        action: Action,
        board: &mut B,
        self_pos: u32,
    ) -> Result<StepResult, TrusteeError> {
        match action {
            Action::Stop(msg) => {
                info!("halted: {}", msg);
                Ok(StepResult::stopped(msg))
            }
            action => match self.trustee.execute(&action, board) {
                Ok(_) => Ok(StepResult {
                    executed: 1,
                    errors: vec![],
                    stopped: None,
                }),
                Err(e) => {
                    let mut errors = Vec::new();
                    let mut postable = Vec::new();
                    collect_error(&action, e, &mut errors, &mut postable);
                    if !postable.is_empty() {
                        board.add_error(&postable.join("; "), self_pos)?;
                    }
                    Ok(StepResult {
                        executed: 0,
                        errors,
                        stopped: None,
                    })
                }
            },
        }
    }

    fn global_rules(&self, n: u32, self_pos: u32) -> Vec<Rule> {
        let mut rules = Vec::new();

        rules.push(Rule::new(
            Condition::present(B::PAUSE),
            Action::Stop("pause is present on the board".to_string()),
        ));

        // any error halts: negation of "all error keys absent"
        let mut no_errors = Condition::absent(B::ERROR);
        for auth in 1..=n {
            no_errors = no_errors.and_absent(B::auth_error(auth));
        }
        rules.push(Rule::new(
            no_errors.neg(),
            Action::Stop("an error is present on the board".to_string()),
        ));

        rules.push(Rule::new(
            Condition::present(B::CONFIG)
                .and_present(B::CONFIG_STMT)
                .and_absent(B::config_sig(self_pos)),
            Action::ValidateConfig,
        ));

        rules
    }

    fn item_rules(&self, item: u32, n: u32, self_pos: u32) -> Vec<Rule> {
        let mut rules = Vec::new();

        let mut config_signed_all = Condition::trivial();
        for auth in 1..=n {
            config_signed_all = config_signed_all.and_present(B::config_sig(auth));
        }

        let mut shares_all = Condition::trivial();
        for auth in 1..=n {
            shares_all = shares_all
                .and_present(B::share(item, auth))
                .and_present(B::share_stmt(item, auth))
                .and_present(B::share_sig(item, auth));
        }

        let ballots_present = Condition::present(B::ballots(item))
            .and_present(B::ballots_stmt(item))
            .and_present(B::ballots_sig(item));

        // 1: post own share
        rules.push(Rule::new(
            config_signed_all
                .clone()
                .and_absent(B::share(item, self_pos)),
            Action::AddShare(item),
        ));

        // 2: trustee #1 publishes the combined key
        if self_pos == 1 {
            rules.push(Rule::new(
                shares_all.clone().and_absent(B::public_key(item)),
                Action::AddOrSignPublicKey(item),
            ));
        }

        // 3: everyone co-signs the published key
        rules.push(Rule::new(
            shares_all
                .clone()
                .and_present(B::public_key(item))
                .and_present(B::public_key_stmt(item))
                .and_absent(B::public_key_sig(item, self_pos)),
            Action::AddOrSignPublicKey(item),
        ));

        // 4: precompute the offline phase of the shuffle
        if self.trustee.offline_split {
            rules.push(Rule::new(
                ballots_present
                    .clone()
                    .and_absent(B::perm_data(item, self_pos))
                    .and_absent(B::mix(item, self_pos)),
                Action::AddPreShuffleData(item),
            ));
        }

        // 5: mix once all earlier positions are present and self-signed
        let position = mix_position(self_pos, item, n);
        let mut earlier_mixed = ballots_present
            .clone()
            .and_present(B::public_key(item))
            .and_absent(B::mix(item, self_pos));
        for pos in 1..position {
            let mixer = trustee_at_position(pos, item, n);
            earlier_mixed = earlier_mixed
                .and_present(B::mix(item, mixer))
                .and_present(B::mix_stmt(item, mixer))
                .and_present(B::mix_sig(item, mixer, mixer));
        }
        rules.push(Rule::new(earlier_mixed, Action::AddMix(item)));

        // 6: verify and co-sign other trustees' mixes
        for auth in (1..=n).filter(|a| *a != self_pos) {
            rules.push(Rule::new(
                Condition::present(B::mix(item, auth))
                    .and_present(B::mix_stmt(item, auth))
                    .and_present(B::mix_sig(item, auth, auth))
                    .and_absent(B::mix_sig(item, auth, self_pos)),
                Action::VerifyMix(item, auth),
            ));
        }

        // 7: decrypt once every mix carries this trustee's signature
        let mut all_mixes_signed = Condition::trivial();
        for auth in 1..=n {
            all_mixes_signed = all_mixes_signed.and_present(B::mix_sig(item, auth, self_pos));
        }
        rules.push(Rule::new(
            all_mixes_signed.and_absent(B::decryption(item, self_pos)),
            Action::AddDecryption(item),
        ));

        // 8: the designated decryptor assembles the plaintexts
        let mut decryptions_all = Condition::trivial();
        for auth in 1..=n {
            decryptions_all = decryptions_all
                .and_present(B::decryption(item, auth))
                .and_present(B::decryption_stmt(item, auth))
                .and_present(B::decryption_sig(item, auth));
        }
        if decryptor(item, n) == self_pos {
            rules.push(Rule::new(
                decryptions_all.clone().and_absent(B::plaintexts(item)),
                Action::AddOrSignPlaintexts(item),
            ));
        }

        // 9: everyone else co-signs the plaintexts
        rules.push(Rule::new(
            JointCondition::of(vec![
                decryptions_all,
                Condition::present(B::plaintexts(item))
                    .and_present(B::plaintexts_stmt(item))
                    .and_absent(B::plaintexts_sig(item, self_pos)),
            ]),
            Action::AddOrSignPlaintexts(item),
        ));

        rules
    }
}

fn collect_error(
    action: &Action,
    error: TrusteeError,
    errors: &mut Vec<String>,
    postable: &mut Vec<String>,
) {
    let message = format!("{:?}: {}", action, error);
    warn!("{}", message);
    if error.postable() {
        postable.push(message.clone());
    }
    errors.push(message);
}

/// Convenience used by tests and demos: run cycles for each protocol in
/// turn until a full round makes no progress.
pub fn run_until_idle<B: BulletinBoard + Sync>(
    protocols: &[&Protocol<B>],
    board: &mut B,
    max_cycles: u32,
) -> Result<u32, TrusteeError> {
    let mut total = 0;
    for _ in 0..max_cycles {
        let mut round = 0;
        for protocol in protocols {
            let result = protocol.step(board)?;
            round += result.executed;
        }
        if round == 0 {
            return Ok(total);
        }
        total += round;
    }

    Ok(total)
}
