use std::time::Duration;

use bytes::Bytes;

use super::{fixture, fixture_with_idle_timeout};

/// ## 空闲超时触发
///
/// - **意图 (Why)**：对端发来请求后停滞时，编排器必须主动收尾，而不是无限等待下去；
/// - **逻辑 (How)**：收一帧使端点进入等待，推进虚拟时钟整整一个超时周期后调用 `poll`；
/// - **契约 (What)**：`timeout` 自传输侧起逐阶段下发，且先于本次等待；脚本化端点以空应答结束交换。
#[test]
fn stalled_exchange_fires_timeout_before_waiting() {
    let mut fx = fixture("a,b");
    fx.script.push_frame(&b"request"[..]);
    fx.relay.pump().expect("排空");
    assert!(fx.relay.is_waiting().expect("查询等待"), "收到请求后应处于等待");
    fx.log.take();

    fx.clock.advance(Duration::from_secs(1));
    let readiness = fx.relay.poll(None).expect("轮询");

    assert!(readiness.is_empty());
    assert_eq!(fx.script.timeouts(), 1);
    assert_eq!(
        fx.log.take(),
        ["scripted.timeout", "a.timeout", "b.timeout"],
        "超时应自传输侧向应用侧传播"
    );
    assert_eq!(fx.script.sent(), [Bytes::new()], "超时应以空应答结束交换");
    assert!(!fx.relay.is_waiting().expect("查询等待"));
}

/// 超时已过期很久时同样只触发一次，随后照常轮询。
#[test]
fn long_overdue_exchange_times_out_once() {
    let mut fx = fixture("a");
    fx.script.push_frame(&b"request"[..]);
    fx.relay.pump().expect("排空");

    fx.clock.advance(Duration::from_secs(30));
    fx.relay.poll(Some(Duration::from_millis(10))).expect("轮询");
    fx.relay.poll(Some(Duration::from_millis(10))).expect("再次轮询");

    assert_eq!(fx.script.timeouts(), 1);
    assert_eq!(
        fx.script.polls(),
        [Duration::from_millis(10), Duration::from_millis(10)]
    );
}

/// ## 持续活动不触发超时
///
/// - **意图 (Why)**：只要对端每次都在超时前再次发来数据，交换就是健康的；
/// - **逻辑 (How)**：每轮推进 900ms 后到达一帧，调用 `step` 完成轮询与排空；
/// - **契约 (What)**：`timeout` 从未被调用；等待时长被收紧为距离截止时间的剩余量。
#[test]
fn continuous_activity_never_times_out() {
    let mut fx = fixture("a");

    for round in 0..10 {
        fx.clock.advance(Duration::from_millis(900));
        fx.script.push_frame(Bytes::from(format!("frame-{round}")));
        let readiness = fx.relay.step(None).expect("单步");
        assert!(readiness.socket_ready());
    }

    assert_eq!(fx.script.timeouts(), 0);
    assert_eq!(fx.relay.take_frames().expect("取帧").len(), 10);

    let polls = fx.script.polls();
    assert_eq!(polls[0], Duration::from_millis(500), "首轮未等待，使用轮询间隔");
    assert!(
        polls[1..].iter().all(|wait| *wait == Duration::from_millis(100)),
        "等待中的轮询应收紧到剩余时间：{polls:?}"
    );
}

/// `poll(2s)` 在未等待且无事件时空转满 2 秒，且不触发超时。
#[test]
fn idle_poll_waits_the_requested_duration() {
    let mut fx = fixture("a");
    let start = fx.clock.elapsed();

    let readiness = fx.relay.poll(Some(Duration::from_secs(2))).expect("轮询");

    assert!(readiness.is_empty());
    assert_eq!(fx.clock.elapsed() - start, Duration::from_secs(2));
    assert_eq!(fx.script.timeouts(), 0);
    assert!(fx.log.take().is_empty());
}

/// 等待中调用方给出的更长时限被截断到剩余时间。
#[test]
fn caller_timeout_is_clamped_to_remaining_idle_time() {
    let mut fx = fixture("a");
    fx.script.push_frame(&b"request"[..]);
    fx.relay.pump().expect("排空");
    fx.clock.advance(Duration::from_millis(250));

    fx.relay.poll(Some(Duration::from_secs(5))).expect("轮询");

    assert_eq!(fx.script.polls(), [Duration::from_millis(750)]);
    assert_eq!(fx.script.timeouts(), 0);

    // 空转已把时钟推进到截止时间，下一次轮询必然触发超时。
    fx.relay.poll(Some(Duration::from_secs(5))).expect("再次轮询");
    assert_eq!(fx.script.timeouts(), 1);
}

/// 空闲超时大到截止时间无法表示时，等待中的 `poll` 按调用方时限返回且从不触发超时。
#[test]
fn unrepresentable_idle_deadline_never_fires() {
    let mut fx = fixture_with_idle_timeout("a", Duration::from_secs_f64(1e19));
    fx.script.push_frame(&b"request"[..]);
    fx.relay.pump().expect("排空");
    assert!(fx.relay.is_waiting().expect("查询等待"));

    fx.relay.poll(Some(Duration::ZERO)).expect("零时限轮询");
    fx.relay.poll(Some(Duration::from_millis(10))).expect("短时限轮询");

    assert_eq!(fx.script.timeouts(), 0);
    assert_eq!(
        fx.script.polls(),
        [Duration::ZERO, Duration::from_millis(10)]
    );
    assert!(fx.relay.is_waiting().expect("查询等待"), "交换应保持未完成");
}
