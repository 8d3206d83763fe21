//! # EDF OS Example Firmware
//!
//! Demonstrates deadline scheduling and mailbox IPC with three tasks:
//!
//! | Task | Deadline | Behavior |
//! |------|----------|----------|
//! | `producer_task` | 200 | Samples a counter and hands it over with `send_wait` |
//! | `consumer_task` | 500 | Receives samples with `receive_wait`, forwards a summary |
//! | `monitor_task`  | 1000 | Drains summaries sent with `send_no_wait`, sleeps between polls |
//!
//! ## Expected Behavior
//!
//! 1. The producer (earliest deadline) runs first and blocks on the sample
//!    mailbox until the consumer arrives.
//! 2. The consumer takes each sample by rendezvous and posts a summary to
//!    a small buffered mailbox; when the monitor falls behind, the oldest
//!    summaries are overwritten.
//! 3. Once its deadline passes, a blocked producer is released by the tick
//!    handler and sees `DeadlineReached`; it then terminates.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_halt as _;

use edfos::api;
use edfos::{Error, Mailbox};

static mut SAMPLES: Option<Mailbox> = None;
static mut SUMMARIES: Option<Mailbox> = None;

fn samples() -> Mailbox {
    // SAFETY: written once in `main` before the kernel starts.
    unsafe { SAMPLES.unwrap() }
}

fn summaries() -> Mailbox {
    // SAFETY: written once in `main` before the kernel starts.
    unsafe { SUMMARIES.unwrap() }
}

// ---------------------------------------------------------------------------
// Task entry points
// ---------------------------------------------------------------------------

/// **Producer** (deadline 200)
///
/// Hands over one sample per rendezvous until its deadline passes.
extern "C" fn producer_task() -> ! {
    let mut sample: u32 = 0;
    loop {
        sample = sample.wrapping_add(1);
        if let Err(Error::DeadlineReached) = api::send_wait(samples(), &sample.to_le_bytes()) {
            api::terminate();
        }
    }
}

/// **Consumer** (deadline 500)
///
/// Receives samples by rendezvous and posts a running sum without blocking.
/// Summaries that find the message pool full are counted in `lost`.
extern "C" fn consumer_task() -> ! {
    let mut sum: u32 = 0;
    let mut lost: u32 = 0;
    let mut buf = [0u8; 4];
    loop {
        if api::receive_wait(samples(), &mut buf).is_err() {
            api::terminate();
        }
        sum = sum.wrapping_add(u32::from_le_bytes(buf));
        match api::send_no_wait(summaries(), &sum.to_le_bytes()) {
            Ok(()) => {}
            // Message pool exhausted: skip this summary, the next one
            // carries the running sum anyway.
            Err(Error::Fail) => {
                lost = lost.wrapping_add(1);
                api::yield_now();
            }
            Err(_) => api::terminate(),
        }
    }
}

/// **Monitor** (deadline 1000)
///
/// Polls the summary mailbox every 10 ticks.
extern "C" fn monitor_task() -> ! {
    let mut latest = [0u8; 4];
    loop {
        if api::receive_wait(summaries(), &mut latest).is_err() {
            api::terminate();
        }
        if api::wait(10).is_err() {
            api::terminate();
        }
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Firmware entry point. Initializes the kernel, creates mailboxes and
/// tasks, and starts scheduling. Does not return.
#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();

    api::init_kernel().expect("kernel init failed");

    let samples = api::create_mailbox(0, 4).expect("Failed to create sample mailbox");
    let summaries = api::create_mailbox(4, 4).expect("Failed to create summary mailbox");
    // SAFETY: no task runs yet.
    unsafe {
        SAMPLES = Some(samples);
        SUMMARIES = Some(summaries);
    }

    api::create_task(producer_task, 200).expect("Failed to create producer_task");
    api::create_task(consumer_task, 500).expect("Failed to create consumer_task");
    api::create_task(monitor_task, 1000).expect("Failed to create monitor_task");

    match api::run(cp) {
        Ok(never) => match never {},
        Err(err) => panic!("kernel start failed: {}", err),
    }
}
