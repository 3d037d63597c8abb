use channelz_types::Timestamp;
use std::sync::OnceLock;
use std::time::SystemTime;

struct CycleClock {
    clock: quanta::Clock,
    anchor_raw: u64,
    anchor_wall: SystemTime,
}

fn cycle_clock() -> &'static CycleClock {
    static CLOCK: OnceLock<CycleClock> = OnceLock::new();
    CLOCK.get_or_init(|| {
        let clock = quanta::Clock::new();
        let anchor_raw = clock.raw();
        CycleClock {
            clock,
            anchor_raw,
            anchor_wall: SystemTime::now(),
        }
    })
}

/// Raw cycle reading. Opaque: only meaningful through [`cycle_to_timestamp`].
pub(crate) fn cycle_now() -> u64 {
    cycle_clock().clock.raw()
}

pub(crate) fn cycle_to_timestamp(raw: u64) -> Timestamp {
    let clock = cycle_clock();
    let wall = if raw >= clock.anchor_raw {
        clock.anchor_wall + clock.clock.delta(clock.anchor_raw, raw)
    } else {
        clock
            .anchor_wall
            .checked_sub(clock.clock.delta(raw, clock.anchor_raw))
            .unwrap_or(SystemTime::UNIX_EPOCH)
    };
    Timestamp::from(wall)
}
