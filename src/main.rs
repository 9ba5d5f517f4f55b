//! # RROS Example Firmware
//!
//! Blinks the four inner LEDs of an STM32F3DISCOVERY board, one task per
//! LED, each with its own period:
//!
//! | Task | LED | Half-period (ticks) |
//! |------|-----|---------------------|
//! | `green_task`  | LD6 (PE11) | 1000 |
//! | `orange_task` | LD5 (PE10) | 500  |
//! | `blue_task`   | LD4 (PE8)  | 250  |
//! | `red_task`    | LD3 (PE9)  | 125  |
//!
//! Each task spends nearly all its time blocked in `task_delay`, so the idle
//! task runs (and sleeps in WFI) between blinks.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use defmt_rtt as _;
use panic_halt as _;

use rros::kernel;

// ---------------------------------------------------------------------------
// LED driver
// ---------------------------------------------------------------------------

mod led {
    //! Minimal GPIOE driver for the Discovery LEDs.

    use core::ptr::write_volatile;

    const RCC_AHBENR: *mut u32 = 0x4002_1014 as *mut u32;
    const GPIOE_MODER: *mut u32 = 0x4800_1000 as *mut u32;
    const GPIOE_BSRR: *mut u32 = 0x4800_1018 as *mut u32;

    const IOPEEN: u32 = 1 << 21;

    pub const BLUE: u8 = 8;
    pub const RED: u8 = 9;
    pub const ORANGE: u8 = 10;
    pub const GREEN: u8 = 11;

    /// Clock GPIOE and make every LED pin a push-pull output, all off.
    pub fn init_all() {
        // Safety: single-threaded bring-up, fixed STM32F303 register
        // addresses.
        unsafe {
            let ahbenr = RCC_AHBENR.read_volatile();
            write_volatile(RCC_AHBENR, ahbenr | IOPEEN);

            let mut moder = GPIOE_MODER.read_volatile();
            for pin in [BLUE, RED, ORANGE, GREEN] {
                moder = (moder & !(0b11 << (2 * pin))) | (0b01 << (2 * pin));
            }
            write_volatile(GPIOE_MODER, moder);
        }
        for pin in [BLUE, RED, ORANGE, GREEN] {
            off(pin);
        }
    }

    // BSRR writes are atomic, so tasks never race on the output register.

    pub fn on(pin: u8) {
        // Safety: write-only set/reset register.
        unsafe { write_volatile(GPIOE_BSRR, 1 << pin) }
    }

    pub fn off(pin: u8) {
        // Safety: write-only set/reset register.
        unsafe { write_volatile(GPIOE_BSRR, 1 << (pin + 16)) }
    }
}

// ---------------------------------------------------------------------------
// Task entry points
// ---------------------------------------------------------------------------

fn blink(pin: u8, half_period: u32) -> ! {
    loop {
        led::on(pin);
        kernel::task_delay(half_period);
        led::off(pin);
        kernel::task_delay(half_period);
    }
}

extern "C" fn green_task() -> ! {
    blink(led::GREEN, 1000)
}

extern "C" fn orange_task() -> ! {
    blink(led::ORANGE, 500)
}

extern "C" fn blue_task() -> ! {
    blink(led::BLUE, 250)
}

extern "C" fn red_task() -> ! {
    blink(led::RED, 125)
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Firmware entry point. Registers the tasks and starts the scheduler.
/// Does not return.
#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();
    defmt::info!("RROS starting");

    led::init_all();

    kernel::init().expect("Failed to initialize kernel");
    for task in [green_task, orange_task, blue_task, red_task] {
        kernel::create_task(task).expect("Failed to create task");
    }

    // Start the scheduler — does not return
    kernel::start(cp)
}
