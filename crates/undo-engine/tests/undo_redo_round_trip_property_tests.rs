//! Property-based tests for undo/redo round trip
//!
//! For any sequence of pushes, macros, undos and redos, walking the stack back
//! to its origin and forward again reproduces every intermediate subject, and
//! a packed stack restores to the same history.

use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use undo_engine::{Command, CommandError, LocalContexts, Macro, Packet, Stack, StackConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Tally {
    items: Vec<i32>,
    total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TallyCommand {
    Append(i32),
    Add(i64),
}

impl Command<Tally> for TallyCommand {
    fn apply(&mut self, tally: &mut Tally, _ctx: &LocalContexts) -> Result<(), CommandError> {
        match self {
            TallyCommand::Append(v) => tally.items.push(*v),
            TallyCommand::Add(d) => tally.total += *d,
        }
        Ok(())
    }

    fn revert(&mut self, tally: &mut Tally, _ctx: &LocalContexts) -> Result<(), CommandError> {
        match self {
            TallyCommand::Append(_) => {
                tally.items.pop();
            }
            TallyCommand::Add(d) => tally.total -= *d,
        }
        Ok(())
    }

    fn caption(&self, _ctx: &LocalContexts) -> String {
        match self {
            TallyCommand::Append(v) => format!("append {}", v),
            TallyCommand::Add(d) => format!("add {}", d),
        }
    }

    fn merge_id(&self) -> Option<u32> {
        match self {
            TallyCommand::Append(_) => None,
            TallyCommand::Add(_) => Some(1),
        }
    }

    fn try_merge_with(&mut self, other: &Self) -> bool {
        match (self, other) {
            (TallyCommand::Add(d), TallyCommand::Add(o)) => {
                *d += *o;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
enum Step {
    Push(TallyCommand),
    Macro(Vec<TallyCommand>),
    Undo,
    Redo,
    SetClean,
}

// Strategy for generating commands
fn arb_command() -> impl Strategy<Value = TallyCommand> {
    prop_oneof![
        any::<i32>().prop_map(TallyCommand::Append),
        (-1000i64..1000).prop_map(TallyCommand::Add),
    ]
}

// Strategy for generating stack operations
fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => arb_command().prop_map(Step::Push),
        1 => prop::collection::vec(arb_command(), 0..5).prop_map(Step::Macro),
        2 => Just(Step::Undo),
        2 => Just(Step::Redo),
        1 => Just(Step::SetClean),
    ]
}

// Strategy for generating stack configurations
fn arb_config() -> impl Strategy<Value = StackConfig> {
    (0usize..8, any::<bool>()).prop_map(|(undo_limit, merge_enabled)| StackConfig {
        undo_limit,
        merge_enabled,
    })
}

fn run(stack: &mut Stack<Tally, TallyCommand>, steps: &[Step]) {
    for step in steps {
        match step {
            Step::Push(c) => stack.push(c.clone()).unwrap(),
            Step::Macro(children) => {
                stack.begin_macro(format!("macro of {}", children.len()));
                for c in children {
                    stack.push(c.clone()).unwrap();
                }
                stack.end_macro().unwrap();
            }
            Step::Undo => stack.undo().unwrap(),
            Step::Redo => stack.redo().unwrap(),
            Step::SetClean => stack.set_clean().unwrap(),
        }
    }
}

/// Subject at every position, collected by walking back to the origin
fn snapshots(stack: &mut Stack<Tally, TallyCommand>) -> Vec<Tally> {
    let start = stack.idx();
    let mut seen = vec![stack.subject().clone()];
    while stack.can_undo() {
        stack.undo().unwrap();
        seen.push(stack.subject().clone());
    }
    seen.reverse();
    stack.set_index(start).unwrap();
    seen
}

proptest! {
    /// With unlimited history, undoing everything yields the initial subject and
    /// redoing everything yields the fully applied one.
    #[test]
    fn prop_undo_redo_round_trip(
        steps in prop::collection::vec(arb_step(), 1..40),
        merge_enabled in any::<bool>(),
    ) {
        let config = StackConfig { undo_limit: 0, merge_enabled };
        let mut stack = Stack::with_config(Tally::default(), config);
        run(&mut stack, &steps);
        let here = stack.subject().clone();
        let idx = stack.idx();

        stack.set_index(0).unwrap();
        prop_assert_eq!(stack.subject(), &Tally::default());
        prop_assert!(!stack.can_undo());

        stack.set_index(idx).unwrap();
        prop_assert_eq!(stack.subject(), &here);
    }

    /// The undo limit bounds the history without breaking the walk.
    #[test]
    fn prop_undo_redo_with_stack_limits(
        steps in prop::collection::vec(arb_step(), 1..60),
        config in arb_config(),
    ) {
        let limit = config.undo_limit;
        let mut stack = Stack::with_config(Tally::default(), config);

        for step in &steps {
            run(&mut stack, std::slice::from_ref(step));
            if limit > 0 {
                prop_assert!(stack.len() <= limit,
                    "history should not exceed the configured limit");
            }
            prop_assert!(stack.idx() <= stack.len());
        }

        let here = stack.subject().clone();
        let idx = stack.idx();
        let walked = snapshots(&mut stack);
        prop_assert_eq!(walked.len(), idx + 1);
        prop_assert_eq!(walked.last(), Some(&here));
        prop_assert_eq!(stack.subject(), &here);
    }

    /// A packed stack restores to the same subject, positions, history and
    /// configuration.
    #[test]
    fn prop_pack_restore_round_trip(
        steps in prop::collection::vec(arb_step(), 1..30),
        zipped in any::<bool>(),
        config in arb_config(),
    ) {
        let mut stack = Stack::with_config(Tally::default(), config);
        run(&mut stack, &steps);

        let blob = Packet::make(&stack, "tally", 1)
            .native()
            .zipped(zipped)
            .store()
            .unwrap();
        let peeked = Packet::peek(&blob, |info| info.id == "tally").unwrap();
        let mut restored: Stack<Tally, TallyCommand> = peeked
            .restore(|stored, _| serde_json::from_value(stored).ok())
            .into_stack()
            .unwrap();

        prop_assert_eq!(restored.subject(), stack.subject());
        prop_assert_eq!(restored.config(), stack.config());
        prop_assert_eq!(restored.len(), stack.len());
        prop_assert_eq!(restored.idx(), stack.idx());
        prop_assert_eq!(restored.clean_idx(), stack.clean_idx());
        prop_assert_eq!(restored.undo_caption(), stack.undo_caption());
        prop_assert_eq!(restored.redo_caption(), stack.redo_caption());

        prop_assert_eq!(snapshots(&mut restored), snapshots(&mut stack));
        restored.set_index(usize::MAX).unwrap();
        stack.set_index(usize::MAX).unwrap();
        prop_assert_eq!(restored.subject(), stack.subject());
    }

    /// A macro pushed onto a second stack has the same effect as on the first.
    #[test]
    fn prop_macro_transplant(
        children in prop::collection::vec(arb_command(), 0..8),
        seed in prop::collection::vec(arb_command(), 0..4),
    ) {
        let mut first = Stack::new(Tally::default());
        first.begin_macro("m");
        for c in &children {
            first.push(c.clone()).unwrap();
        }
        first.end_macro().unwrap();
        let built = first.macro_at(0).cloned().unwrap();
        prop_assert_eq!(built.len(), children.len());

        let mut second = Stack::new(Tally::default());
        for c in &seed {
            second.push(c.clone()).unwrap();
        }
        let before = second.subject().clone();
        second.push_macro(built).unwrap();

        let mut expected = before.clone();
        let ctx = LocalContexts::new();
        let mut replay: Macro<TallyCommand> = children
            .iter()
            .cloned()
            .fold(Macro::new("m"), Macro::with_command);
        replay.apply(&mut expected, &ctx).unwrap();
        prop_assert_eq!(second.subject(), &expected);

        second.undo().unwrap();
        prop_assert_eq!(second.subject(), &before);
    }
}
