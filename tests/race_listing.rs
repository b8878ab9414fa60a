#![allow(non_snake_case)]
use horserace_client::{
    contract::{
        BetInfo,
        BetRecord,
        RaceRecord,
        RaceStatus,
    },
    test_helpers::TestContext,
};

fn race(status: RaceStatus, winner: u8) -> RaceRecord {
    RaceRecord {
        status,
        horses: 6,
        total_pool_wei: 2_000,
        winner_horse_id: winner,
    }
}

#[tokio::test]
async fn refresh_races__lists_races_in_ascending_order_with_merged_bets() {
    // given: three races, the caller has bets on the first and last
    let ctx = TestContext::new();
    ctx.chain.push_race(race(RaceStatus::Open, 0));
    ctx.chain.push_race(race(RaceStatus::Locked, 0));
    ctx.chain.push_race(race(RaceStatus::Finished, 2));
    ctx.chain.set_bet(
        0,
        TestContext::alice(),
        BetRecord {
            horse_id: 1,
            amount_wei: 500,
        },
    );
    ctx.chain.set_bet(
        2,
        TestContext::alice(),
        BetRecord {
            horse_id: 2,
            amount_wei: 700,
        },
    );
    let controller = ctx.controller();

    // when
    controller.refresh_races().await;

    // then
    let races = controller.snapshot().races.unwrap();
    assert_eq!(
        races.iter().map(|r| r.race_id).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(
        races[0].my_bet,
        Some(BetInfo {
            horse_id: 1,
            amount_wei: 500,
        })
    );
    assert_eq!(races[1].my_bet, None);
    assert_eq!(
        races[2].my_bet,
        Some(BetInfo {
            horse_id: 2,
            amount_wei: 700,
        })
    );
    // only the finished race exposes its winner
    assert_eq!(races[0].winner_horse_id, None);
    assert_eq!(races[2].winner_horse_id, Some(2));
    assert!(!races[0].locked);
    assert!(races[1].locked);
}

#[tokio::test]
async fn refresh_races__degrades_a_failed_bet_lookup_to_no_bet() {
    // given: the bet lookup for the middle race fails
    let ctx = TestContext::new();
    for _ in 0..3 {
        ctx.chain.push_race(race(RaceStatus::Open, 0));
    }
    for race_id in 0..3 {
        ctx.chain.set_bet(
            race_id,
            TestContext::alice(),
            BetRecord {
                horse_id: 1,
                amount_wei: 500,
            },
        );
    }
    ctx.chain.fail_bet_lookup(1);
    let controller = ctx.controller();

    // when
    controller.refresh_races().await;

    // then: the listing survives; only the affected race shows no bet
    let races = controller.snapshot().races.unwrap();
    assert_eq!(races.len(), 3);
    assert!(races[0].my_bet.is_some());
    assert_eq!(races[1].my_bet, None);
    assert!(races[2].my_bet.is_some());
}

#[tokio::test]
async fn refresh_races__fails_the_whole_listing_when_a_race_read_fails() {
    // given
    let ctx = TestContext::new();
    ctx.chain.push_race(race(RaceStatus::Open, 0));
    ctx.chain.fail_method("race");
    let controller = ctx.controller();

    // when
    controller.refresh_races().await;

    // then
    assert_eq!(controller.snapshot().races, None);
    assert!(controller.last_message().contains("race listing failed"));
}

#[tokio::test]
async fn refresh_races__without_an_account_lists_races_with_no_bets() {
    // given: a connected chain but no signing account
    let ctx = TestContext::new();
    ctx.source.set_account(None);
    ctx.chain.push_race(race(RaceStatus::Open, 0));
    let controller = ctx.controller();

    // when
    controller.refresh_races().await;

    // then: the listing works read-only, skipping bet lookups entirely
    let races = controller.snapshot().races.unwrap();
    assert_eq!(races.len(), 1);
    assert_eq!(races[0].my_bet, None);
    assert_eq!(ctx.chain.calls("bet"), 0);
}

#[tokio::test]
async fn refresh_races__with_no_races_yields_an_empty_list() {
    let ctx = TestContext::new();
    let controller = ctx.controller();

    controller.refresh_races().await;

    assert_eq!(controller.snapshot().races, Some(vec![]));
}

#[tokio::test]
async fn refresh_races__a_zero_amount_bet_counts_as_no_bet() {
    // given
    let ctx = TestContext::new();
    ctx.chain.push_race(race(RaceStatus::Open, 0));
    ctx.chain.set_bet(
        0,
        TestContext::alice(),
        BetRecord {
            horse_id: 3,
            amount_wei: 0,
        },
    );
    let controller = ctx.controller();

    // when
    controller.refresh_races().await;

    // then
    let races = controller.snapshot().races.unwrap();
    assert_eq!(races[0].my_bet, None);
}
