//! Fee pricing driven through a genesis ArbOS state.
use arbos::{
    primitives::{address, Address, Bytes, GWEI, L1_PRICER_FUNDS_POOL_ADDRESS, U256},
    ArbosInitParams, ArbosState, ArbosVersion, InMemoryStorage, UpdateResult,
};
use rstest::rstest;

const OWNER: Address = address!("0x00000000000000000000000000000000000000a1");
const POSTER: Address = address!("0x0000000000000000000000000000000000005057");

/// Calldata units posted per second.
const UNITS_PER_SECOND: u64 = 1_600_000;

fn genesis(version: ArbosVersion, l1_base_fee: u64) -> (InMemoryStorage, ArbosState) {
    let mut db = InMemoryStorage::new();
    let params = ArbosInitParams {
        initial_arbos_version: version,
        chain_owner: OWNER,
        chain_id: U256::from(412_346),
        genesis_block_num: 0,
        initial_l1_base_fee: U256::from(l1_base_fee),
        serialized_chain_config: Bytes::new(),
    };
    let state = ArbosState::initialize(&mut db, &params).unwrap();
    (db, state)
}

#[rstest]
#[case::rising(ArbosVersion::STYLUS_CHARGING_FIXES, GWEI, 50 * GWEI)]
#[case::falling(ArbosVersion::STYLUS_CHARGING_FIXES, 80 * GWEI, 20 * GWEI)]
#[case::pool_balance_rising(ArbosVersion::new(5), GWEI, 50 * GWEI)]
#[case::pool_balance_falling(ArbosVersion::new(5), 80 * GWEI, 20 * GWEI)]
fn test_l1_price_converges(
    #[case] version: ArbosVersion,
    #[case] start_price: u64,
    #[case] true_price: u64,
) {
    let (mut db, state) = genesis(version, start_price);
    let l1 = state.l1_pricing_state();
    let true_price = U256::from(true_price);

    for time in 1..=1000u64 {
        // Users pay the current estimate for the calldata they post.
        let collected = l1.price_per_unit(&mut db).unwrap() * U256::from(UNITS_PER_SECOND);
        let pool = db.balance_of(L1_PRICER_FUNDS_POOL_ADDRESS);
        db.insert_balance(L1_PRICER_FUNDS_POOL_ADDRESS, pool + collected);
        l1.add_to_l1_fees_available(&mut db, collected).unwrap();
        l1.add_to_units_since_update(&mut db, UNITS_PER_SECOND).unwrap();

        // The batch cost the poster the true price for the same units.
        let spent = true_price * U256::from(UNITS_PER_SECOND);
        let result = l1
            .update_for_batch_poster_spending(
                &mut db,
                state.version(),
                time,
                time,
                POSTER,
                spent,
                true_price,
            )
            .unwrap();
        assert_eq!(result, UpdateResult::Ok);
        if version.is_enabled_in(ArbosVersion::L1_FEES_AVAILABLE) {
            assert_eq!(
                l1.l1_fees_available(&mut db).unwrap(),
                db.balance_of(L1_PRICER_FUNDS_POOL_ADDRESS)
            );
        }
    }

    let price = l1.price_per_unit(&mut db).unwrap();
    let diff = if price > true_price {
        price - true_price
    } else {
        true_price - price
    };
    assert!(
        diff * U256::from(100) <= true_price,
        "price {price} not within 1% of {true_price}"
    );
}

#[test]
fn test_l2_base_fee_tracks_backlog() {
    let (mut db, state) = genesis(ArbosVersion::STYLUS_CHARGING_FIXES, GWEI);
    let l2 = state.l2_pricing_state();
    let min_base_fee = l2.min_base_fee_wei(&mut db).unwrap();

    // Blocks using twice the speed limit build a backlog up to the tolerance.
    for _ in 0..10 {
        l2.add_to_gas_pool(&mut db, -14_000_000).unwrap();
        l2.update_pricing_model(&mut db, 1).unwrap();
    }
    assert_eq!(l2.gas_backlog(&mut db).unwrap(), 70_000_000);
    assert_eq!(l2.base_fee_wei(&mut db).unwrap(), min_base_fee);

    let mut last = min_base_fee;
    for _ in 0..20 {
        l2.add_to_gas_pool(&mut db, -14_000_000).unwrap();
        l2.update_pricing_model(&mut db, 1).unwrap();
        let fee = l2.base_fee_wei(&mut db).unwrap();
        assert!(fee > last);
        last = fee;
    }

    // Idle time drains the backlog and the fee returns to the minimum.
    l2.update_pricing_model(&mut db, 100).unwrap();
    assert_eq!(l2.gas_backlog(&mut db).unwrap(), 0);
    assert_eq!(l2.base_fee_wei(&mut db).unwrap(), min_base_fee);
}

#[test]
fn test_l2_constraints_after_upgrade() {
    let (mut db, mut state) = genesis(ArbosVersion::PARENT_BLOCK_HASH, GWEI);
    let l2 = state.l2_pricing_state();
    l2.add_gas_constraint(&mut db, 7_000_000, 102, 50_000_000)
        .unwrap();
    l2.update_pricing_model(&mut db, 1).unwrap();
    // Not active yet: the legacy backlog is empty.
    assert_eq!(
        l2.base_fee_wei(&mut db).unwrap(),
        l2.min_base_fee_wei(&mut db).unwrap()
    );

    state
        .upgrade_arbos_version(&mut db, ArbosVersion::MULTI_CONSTRAINT_PRICING, false)
        .unwrap();
    let l2 = state.l2_pricing_state();
    assert!(l2.should_use_gas_constraints(&mut db).unwrap());
    l2.update_pricing_model(&mut db, 1).unwrap();
    assert_eq!(
        l2.open_gas_constraint_at(0).backlog(&mut db).unwrap(),
        43_000_000
    );
    assert_eq!(l2.base_fee_wei(&mut db).unwrap(), U256::from(106_200_000));
}
