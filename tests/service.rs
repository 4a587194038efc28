mod common;

use std::time::Duration;

use common::{recording_motor, FakeGpio};
use curtaind::config::CurtainConfig;
use curtaind::curtain::{CurtainError, CurtainService, LimitSwitch, StopReason};
use curtaind::gpio::{Level, WatcherError};
use curtaind::motor::Direction;

fn quick_config() -> CurtainConfig {
    let mut config = CurtainConfig::default();
    config.motion.full_travel_ms = 2_000;
    config.motion.settle_ms = 20;
    config.switches.debounce_ms = 20;
    config.watcher.wake_interval_ms = 20;
    config
}

#[tokio::test]
async fn test_switch_press_stops_motion() {
    let config = quick_config();
    let gpio = FakeGpio::new();
    let (motor, log) = recording_motor();
    let service = CurtainService::start(&config, gpio.clone(), motor).await.unwrap();
    assert_eq!(gpio.open_handles(), 2);

    let handle = service.handle();
    let press = async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        gpio.set_level(config.pins.switch_right, Level::Low);
    };
    let (outcome, ()) = tokio::join!(handle.move_to(0.5), press);
    let outcome = outcome.unwrap();

    assert_eq!(outcome.stopped_by, StopReason::HardStop(LimitSwitch::Open));
    assert_eq!(outcome.position, 1.0);
    assert!(outcome.elapsed < Duration::from_secs(1));
    assert_eq!(log.rotations()[0].1, Direction::Counterclockwise);

    service.close().await.unwrap();
    assert_eq!(gpio.open_handles(), 0);
    assert_eq!(log.last(), Some(Direction::Stop));
    assert!(matches!(handle.move_to(0.0).await, Err(CurtainError::Closed)));
}

#[tokio::test]
async fn test_watcher_failure_surfaces_from_wait() {
    let config = quick_config();
    let gpio = FakeGpio::new();
    let (motor, _log) = recording_motor();
    let mut service = CurtainService::start(&config, gpio.clone(), motor).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    gpio.set_raw(config.pins.switch_left, Some(b'?'));

    let err = tokio::time::timeout(Duration::from_secs(2), service.wait())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(
        err,
        CurtainError::Watcher(WatcherError::InvalidLevel { byte: b'?', .. })
    ));

    service.close().await.unwrap();
    assert_eq!(gpio.open_handles(), 0);
}

#[tokio::test]
async fn test_start_fails_when_switch_cannot_be_watched() {
    let config = quick_config();
    let gpio = FakeGpio::new();
    gpio.fail_pin(config.pins.switch_right);
    let (motor, _log) = recording_motor();

    let result = CurtainService::start(&config, gpio.clone(), motor).await;
    assert!(matches!(
        result,
        Err(CurtainError::Watcher(WatcherError::Open { .. }))
    ));
    assert_eq!(gpio.open_handles(), 0);
}
