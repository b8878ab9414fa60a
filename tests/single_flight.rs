#![allow(non_snake_case)]
use horserace_client::{
    contract::{
        RaceRecord,
        RaceStatus,
    },
    test_helpers::{
        handle,
        TestContext,
    },
    types::ClearValue,
};

#[tokio::test]
async fn refresh_wins_handle__concurrent_triggers_collapse_to_one_read() {
    // given
    let ctx = TestContext::new();
    ctx.chain.set_wins_handle(handle(7));
    let controller = ctx.controller();

    // when: two triggers race while the first is suspended on the chain
    tokio::join!(
        controller.refresh_wins_handle(),
        controller.refresh_wins_handle()
    );

    // then
    assert_eq!(ctx.chain.calls("wins_handle"), 1);
    assert_eq!(controller.snapshot().wins_handle, Some(handle(7)));
}

#[tokio::test]
async fn decrypt_wins__concurrent_triggers_collapse_to_one_decrypt() {
    // given
    let ctx = TestContext::new();
    ctx.chain.set_wins_handle(handle(7));
    ctx.fhe.set_plaintext(handle(7), ClearValue::U64(3));
    let controller = ctx.controller();
    controller.refresh_wins_handle().await;

    // when
    tokio::join!(controller.decrypt_wins(), controller.decrypt_wins());

    // then
    assert_eq!(ctx.fhe.decrypt_calls(), 1);
    assert_eq!(ctx.signer.sign_calls(), 1);
}

#[tokio::test]
async fn update_wins__is_blocked_while_a_refresh_is_in_flight() {
    // given
    let ctx = TestContext::new();
    ctx.chain.set_wins_handle(handle(7));
    let controller = ctx.controller();

    // when: the update fires while the refresh holds its slot
    tokio::join!(controller.refresh_wins_handle(), controller.update_wins(1));

    // then: the update never started
    assert_eq!(ctx.fhe.encrypt_calls(), 0);
    assert_eq!(ctx.chain.calls("increase_wins"), 0);
    assert_eq!(ctx.chain.calls("wins_handle"), 1);
}

#[tokio::test]
async fn refresh_races__concurrent_triggers_collapse_to_one_enumeration() {
    // given
    let ctx = TestContext::new();
    ctx.chain.push_race(RaceRecord {
        status: RaceStatus::Open,
        horses: 4,
        total_pool_wei: 0,
        winner_horse_id: 0,
    });
    let controller = ctx.controller();

    // when
    tokio::join!(controller.refresh_races(), controller.refresh_races());

    // then
    assert_eq!(ctx.chain.calls("next_race_id"), 1);
    assert_eq!(
        controller.snapshot().races.map(|races| races.len()),
        Some(1)
    );
}

#[tokio::test]
async fn slots__an_operation_can_run_again_after_it_finishes() {
    // given
    let ctx = TestContext::new();
    ctx.chain.set_wins_handle(handle(7));
    let controller = ctx.controller();

    // when: sequential triggers, not concurrent ones
    controller.refresh_wins_handle().await;
    controller.refresh_wins_handle().await;

    // then: the slot was released in between
    assert_eq!(ctx.chain.calls("wins_handle"), 2);
    assert!(!controller.snapshot().in_flight.refreshing);
}
