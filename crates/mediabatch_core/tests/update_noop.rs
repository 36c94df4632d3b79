use mediabatch_core::{update, AppState, Msg};

#[test]
fn update_is_noop() {
    let state = AppState::new();
    let (next, effects) = update(state.clone(), Msg::NoOp);

    assert_eq!(state, next);
    assert!(effects.is_empty());
}

#[test]
fn tick_changes_nothing() {
    let mut state = AppState::new();
    state.consume_dirty();
    let (mut next, effects) = update(state, Msg::Tick);

    assert!(effects.is_empty());
    assert!(!next.consume_dirty());
}
