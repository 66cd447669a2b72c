// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! A fake platform for unit tests, which records what the PSCI emulation asks of it.

use super::PsciPlatformInterface;
use crate::per_cpu::CpuIndex;
use percore::Cores;
use std::{
    cell::Cell,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

thread_local! {
    static CURRENT_CORE: Cell<usize> = const { Cell::new(0) };
}

/// Something the PSCI emulation asked the platform to do.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    WakeSignal(usize),
    Park(usize),
    WaitForInterrupt,
    HandleInterrupts(usize),
}

/// Each test thread pretends to be a single physical CPU.
pub struct TestCores;

impl TestCores {
    /// Makes the current thread act as the given physical CPU.
    pub fn set_current(core_index: usize) {
        CURRENT_CORE.with(|core| core.set(core_index));
    }
}

// SAFETY: Each thread only ever reports the index it was given, and tests give every concurrently
// running thread a different one.
unsafe impl Cores for TestCores {
    fn core_index() -> usize {
        CURRENT_CORE.with(Cell::get)
    }
}

#[derive(Debug, Default)]
pub struct TestPlatform {
    events: Mutex<Vec<Event>>,
    pending_interrupt: AtomicBool,
}

impl TestPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything the platform was asked to do so far, in order.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Makes an interrupt pending for the current CPU.
    pub fn raise_interrupt(&self) {
        self.pending_interrupt.store(true, Ordering::SeqCst);
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl PsciPlatformInterface for TestPlatform {
    type Cores = TestCores;

    fn send_wake_signal(&self, cpu: CpuIndex) {
        self.record(Event::WakeSignal(cpu.raw()));
    }

    fn park_cpu(&self, cpu: CpuIndex) {
        self.record(Event::Park(cpu.raw()));
    }

    fn has_pending_interrupts(&self) -> bool {
        self.pending_interrupt.load(Ordering::SeqCst)
    }

    fn wait_for_interrupt(&self) {
        self.record(Event::WaitForInterrupt);
        // Pretend that an interrupt arrived.
        self.raise_interrupt();
    }

    fn handle_pending_interrupts(&self, cpu: CpuIndex) {
        self.record(Event::HandleInterrupts(cpu.raw()));
        self.pending_interrupt.store(false, Ordering::SeqCst);
    }
}
