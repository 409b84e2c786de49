mod common;

use clock_core::controller::{ClockController, ControllerState, Retarget, RetargetError};
use clock_core::pins::PIN_MAP;
use clock_core::scheduler::{SchedulerState, SkipReason, TickOutcome};
use embassy_futures::block_on;
use embassy_futures::join::join;

use common::{FakeLink, TestStore, manual, t};

#[test]
fn retarget_while_one_is_persisting_is_rejected() {
    let config = manual("12:00");
    let store = TestStore::new(config);
    let controller = ClockController::new(FakeLink::connected(), &store, PIN_MAP, &config);
    store.hold_writes();

    let (first, (second, third)) = block_on(join(controller.tick_to_time(t("12:05")), async {
        assert_eq!(controller.state(), ControllerState::Retargeting);
        let second = controller.tick_to_time(t("12:10")).await;
        let third = controller.override_time(t("3:00")).await;

        // Nothing moved while the first write is still open.
        assert_eq!(controller.current_target(), t("12:00"));
        assert!(controller.scheduler().queue().is_empty());
        assert_eq!(store.config().last_time, t("12:00"));

        store.release();
        (second, third)
    }));

    assert_eq!(first, Ok(Retarget::Queued { pulses: 5 }));
    assert_eq!(second, Err(RetargetError::Busy));
    assert_eq!(third, Err(RetargetError::Busy));
    assert_eq!(controller.current_target(), t("12:05"));
    assert_eq!(controller.scheduler().queue().len(), 5);
    assert_eq!(controller.state(), ControllerState::Idle);

    assert_eq!(
        block_on(controller.tick_to_time(t("12:10"))),
        Ok(Retarget::Queued { pulses: 5 })
    );
}

#[test]
fn drain_period_is_skipped_while_a_pulse_is_in_flight() {
    let config = manual("12:00");
    let link = FakeLink::connected();
    let store = TestStore::new(config);
    let controller = ClockController::new(&link, &store, PIN_MAP, &config);
    block_on(controller.tick_to_time(t("12:02"))).unwrap();
    store.hold_writes();

    let scheduler = controller.scheduler();
    let (first, second) = block_on(join(
        scheduler.poll(controller.pins(), &link, &store),
        async {
            assert_eq!(scheduler.state(), SchedulerState::Pulsing);
            let second = scheduler.poll(controller.pins(), &link, &store).await;
            store.release();
            second
        },
    ));

    assert!(matches!(first, TickOutcome::Pulsed { remaining: 1, .. }));
    assert_eq!(second, TickOutcome::Skipped(SkipReason::Busy));
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    assert_eq!(link.take_sent().len(), 4);

    assert!(matches!(
        block_on(scheduler.poll(controller.pins(), &link, &store)),
        TickOutcome::Pulsed { remaining: 0, .. }
    ));
}
