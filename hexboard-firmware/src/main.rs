//! hexboard-firmware
//!
//! Runs the HexBoard control core on an RP2350. Two execution contexts
//! share the board:
//!
//! 1. The TIMER0 alarm 1 interrupt fires once per scheduler tick. It
//!    acknowledges and re-arms the alarm first, then runs at most one
//!    background job: audio output, rotary sampling or one key-matrix
//!    cell, in that priority order.
//! 2. The control task runs the [`Hexboard`] passes in a loop: keys,
//!    wheels, arpeggiator, rotary navigation and audio refill. MIDI it
//!    produces is handed to the USB-MIDI and serial MIDI tasks through two
//!    bounded channels.
//!
//! The interrupt-side objects live in a critical-section mutex that the
//! control task locks only for single short accesses. A finished key scan
//! is copied out under the lock and interpreted after it is released.
//! Audio samples cross over through the lock-free sample ring instead.

#![no_std]
#![no_main]

use core::cell::RefCell;
use core::convert::Infallible;

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::block::ImageDef;
use embassy_rp::gpio::{Flex, Input, Level, Output, Pull};
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::pac;
use embassy_rp::peripherals::{UART0, USB};
use embassy_rp::pwm::{self, Pwm};
use embassy_rp::uart::{self, UartTx};
use embassy_rp::usb::{self, Driver};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_time::{Instant, Timer};
use embassy_usb::class::midi::MidiClass;
use embassy_usb::{Builder, UsbDevice};
use heapless::Vec;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use hexboard_core::config::BOARD_KEY_COUNT;
use hexboard_core::{
    Alarm, AudioOut, ChannelPolicy, ControlConfig, Hexboard, KeyMatrix, KeyPitch, KeyRole,
    LevelSink, MatrixIo, MidiMessage, NavigationEvent, Rotary, RotaryPins, SampleProducer,
    SampleQueue, ScanOrder, Scheduler,
};

// ---------------------------------------------------------------------------
// Boot block and interrupt binding
// ---------------------------------------------------------------------------

/// Tell the RP2350 Boot ROM about our application.
#[link_section = ".start_block"]
#[used]
pub static IMAGE_DEF: ImageDef = embassy_rp::block::ImageDef::secure_exe();

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => usb::InterruptHandler<USB>;
});

// ---------------------------------------------------------------------------
// Type aliases
// ---------------------------------------------------------------------------

type Board = Hexboard<BOARD_KEY_COUNT>;
type UsbDriver = Driver<'static, USB>;
type MidiUart = UartTx<'static, UART0, uart::Async>;

/// MIDI produced during one control pass. A full retune is the largest
/// burst: 6 zone messages plus 7 per channel.
type MidiBatch = Vec<MidiMessage, 128>;

// ---------------------------------------------------------------------------
// Background jobs
// ---------------------------------------------------------------------------

/// The interrupt's jobs, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
enum Job {
    Audio,
    Rotary,
    Scan,
}

/// Everything the alarm interrupt touches.
struct Background {
    scheduler: Scheduler<Job, 3>,
    alarm: TimerAlarm,
    matrix: KeyMatrix<BoardMatrix, BOARD_KEY_COUNT>,
    rotary: Rotary<Input<'static>>,
    audio: AudioOut<'static, PwmLevel, 2>,
}

static BACKGROUND: Mutex<CriticalSectionRawMutex, RefCell<Option<Background>>> =
    Mutex::new(RefCell::new(None));

/// Run `f` on the interrupt-side state inside a critical section.
fn with_background<R>(f: impl FnOnce(&mut Background) -> R) -> Option<R> {
    BACKGROUND.lock(|cell| cell.borrow_mut().as_mut().map(f))
}

#[interrupt]
fn TIMER0_IRQ_1() {
    with_background(|bg| {
        let Some(job) = bg.scheduler.on_interrupt(&mut bg.alarm).copied() else {
            return;
        };
        match job {
            Job::Audio => bg.audio.poll(),
            Job::Rotary => {
                if bg.rotary.poll(Instant::now().as_micros()).is_err() {
                    warn!("rotary pin read failed");
                }
            }
            Job::Scan => {
                if bg.matrix.poll().is_err() {
                    warn!("key matrix read failed");
                }
            }
        }
    });
}

// ---------------------------------------------------------------------------
// Peripheral adapters
// ---------------------------------------------------------------------------

/// TIMER0 alarm 1. Alarm 0 belongs to the embassy time driver.
struct TimerAlarm {
    tick_us: u32,
    target: u32,
}

const ALARM: usize = 1;

impl Alarm for TimerAlarm {
    fn arm(&mut self, tick_us: u32) {
        let timer = pac::TIMER0;
        self.tick_us = tick_us;
        self.target = timer.timerawl().read().wrapping_add(tick_us);
        timer.inte().modify(|w| w.set_alarm(ALARM, true));
        timer.alarm(ALARM).write_value(self.target);
    }

    fn acknowledge(&mut self) {
        let timer = pac::TIMER0;
        timer.intr().write(|w| w.set_alarm(ALARM, true));
        // Advance from the previous target so the tick does not drift. The
        // alarm only matches on equality, so a target already in the past
        // is moved one tick ahead of now.
        let now = timer.timerawl().read();
        self.target = self.target.wrapping_add(self.tick_us);
        if self.target.wrapping_sub(now) as i32 <= 0 {
            self.target = now.wrapping_add(self.tick_us);
        }
        timer.alarm(ALARM).write_value(self.target);
    }
}

/// HexBoard key matrix: four multiplexer select lines and ten column lines.
///
/// The selected column is pulled up and every other column floats, so a
/// pressed key reads low.
struct BoardMatrix {
    mux: [Output<'static>; 4],
    columns: [Flex<'static>; 10],
}

impl MatrixIo for BoardMatrix {
    type Error = Infallible;

    fn select_mux(&mut self, state: u8) -> Result<(), Self::Error> {
        for (bit, pin) in self.mux.iter_mut().enumerate() {
            pin.set_level(Level::from((state >> bit) & 1 == 1));
        }
        Ok(())
    }

    fn select_column(&mut self, previous: usize, column: usize) -> Result<(), Self::Error> {
        self.columns[previous].set_pull(Pull::None);
        self.columns[column].set_pull(Pull::Up);
        Ok(())
    }

    fn read(&mut self, column: usize) -> Result<u16, Self::Error> {
        Ok(self.columns[column].is_high() as u16)
    }
}

/// One PWM output (piezo or audio jack) on channel B of its slice.
struct PwmLevel {
    pwm: Pwm<'static>,
    config: pwm::Config,
}

impl PwmLevel {
    fn new(pwm: Pwm<'static>, config: pwm::Config) -> Self {
        Self { pwm, config }
    }
}

impl LevelSink for PwmLevel {
    fn set_level(&mut self, level: u8) {
        self.config.compare_b = level as u16;
        self.pwm.set_config(&self.config);
    }
}

/// Phase-correct, full clock speed, wrap at 254 so levels 0–255 cover the
/// whole duty range.
fn audio_pwm_config() -> pwm::Config {
    let mut config = pwm::Config::default();
    config.phase_correct = true;
    config.top = 254;
    config.compare_b = 0;
    config
}

// ---------------------------------------------------------------------------
// Static storage
// ---------------------------------------------------------------------------

static SAMPLES: StaticCell<SampleQueue> = StaticCell::new();
static BOARD: StaticCell<Board> = StaticCell::new();

/// MIDI from the control task to the USB task. Dropped when full.
static MIDI_OUT: Channel<CriticalSectionRawMutex, MidiMessage, 128> = Channel::new();

/// The same traffic for the DIN serial port.
static MIDI_SERIAL: Channel<CriticalSectionRawMutex, MidiMessage, 128> = Channel::new();

/// DIN MIDI line rate.
const SERIAL_MIDI_BAUD: u32 = 31_250;

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Forward one pass worth of MIDI to both the USB and the serial task.
fn flush_midi(batch: &mut MidiBatch) {
    for message in batch.iter() {
        if MIDI_OUT.try_send(*message).is_err() {
            warn!("USB MIDI queue full, dropped {}", message);
        }
        if MIDI_SERIAL.try_send(*message).is_err() {
            warn!("serial MIDI queue full, dropped {}", message);
        }
    }
    batch.clear();
}

/// The control loop: every [`Hexboard`] pass, forever.
#[embassy_executor::task]
async fn control_task(board: &'static mut Board, mut producer: SampleProducer<'static>) {
    info!("control loop started");
    let mut midi = MidiBatch::new();

    loop {
        let now = Instant::now().as_micros();

        // Only the copy happens inside the critical section.
        if let Some(snapshot) = with_background(|bg| bg.matrix.take_snapshot()).flatten() {
            board.interpret_snapshot(&snapshot, &mut midi);
        }
        board.update_wheels(now, &mut midi);
        board.arpeggiate(now);

        if let Some(Some(event)) = with_background(|bg| board.interpret_rotary(&mut bg.rotary)) {
            match event {
                NavigationEvent::Select => debug!("menu select"),
                NavigationEvent::Up => debug!("menu up"),
                NavigationEvent::Down => debug!("menu down"),
            }
        }

        board.fill_audio(&mut producer);
        flush_midi(&mut midi);

        Timer::after_micros(250).await;
    }
}

#[embassy_executor::task]
async fn usb_task(mut usb: UsbDevice<'static, UsbDriver>) -> ! {
    usb.run().await
}

/// Drain the MIDI queue into 4-byte USB-MIDI event packets.
#[embassy_executor::task]
async fn midi_task(mut class: MidiClass<'static, UsbDriver>) -> ! {
    loop {
        class.wait_connection().await;
        info!("USB MIDI connected");
        loop {
            let message = MIDI_OUT.receive().await;
            if class.write_packet(&message.to_usb_packet()).await.is_err() {
                break;
            }
        }
        info!("USB MIDI disconnected");
    }
}

/// Drain the serial queue onto the DIN MIDI port.
#[embassy_executor::task]
async fn serial_midi_task(mut tx: MidiUart) -> ! {
    loop {
        let message = MIDI_SERIAL.receive().await;
        if tx.write(&message.to_serial_bytes()).await.is_err() {
            warn!("serial MIDI write failed, dropped {}", message);
        }
    }
}

// ---------------------------------------------------------------------------
// Boot layout
// ---------------------------------------------------------------------------

/// 12-EDO layout used until a tuning collaborator provides pitches.
///
/// Hex keys sit at `pixel = mux × 10 + column`; moving right along a row
/// raises two semitones and moving down a row lowers five.
fn load_boot_layout(board: &mut Board, midi: &mut MidiBatch) {
    let bend_range = board.allocator().bend_range();
    for key in 0..BOARD_KEY_COUNT {
        if board.key_role(key) != KeyRole::Note {
            continue;
        }
        let column = (key >> 4) as i16;
        let row = (key & 0xF) as i16;
        let steps = 2 * column - 5 * row + 30;
        let pitch = KeyPitch::from_midi_pitch(36.0 + steps as f32, steps, true, bend_range);
        // Every note key is in range, the role check above guarantees it.
        let _ = board.set_key_pitch(key, pitch);
    }
    board.retune(ChannelPolicy::Single, midi);
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Default::default());
    info!("hexboard-firmware starting");

    let config = ControlConfig::default();
    let hardware = config.hardware;

    // —— Pin assignments ————————————————————————————————————————————————————
    // MUX      → GP4, GP5, GP2, GP3   (select bits 0..3)
    // COLUMNS  → GP6 .. GP15
    // ROTARY   → A GP20, B GP21, click GP24   (pull-up, active low)
    // PIEZO    → GP23   PWM slice 3 B
    // JACK     → GP25   PWM slice 4 B
    // MIDI OUT → GP0    UART0 TX, 31 250 baud
    // ———————————————————————————————————————————————————————————————————————

    let mux = [
        Output::new(p.PIN_4, Level::Low),
        Output::new(p.PIN_5, Level::Low),
        Output::new(p.PIN_2, Level::Low),
        Output::new(p.PIN_3, Level::Low),
    ];
    let mut columns = [
        Flex::new(p.PIN_6),
        Flex::new(p.PIN_7),
        Flex::new(p.PIN_8),
        Flex::new(p.PIN_9),
        Flex::new(p.PIN_10),
        Flex::new(p.PIN_11),
        Flex::new(p.PIN_12),
        Flex::new(p.PIN_13),
        Flex::new(p.PIN_14),
        Flex::new(p.PIN_15),
    ];
    for column in columns.iter_mut() {
        column.set_as_input();
        column.set_pull(Pull::None);
    }
    columns[0].set_pull(Pull::Up);

    let order = if hardware.mux_first {
        ScanOrder::MuxFirst
    } else {
        ScanOrder::ColumnFirst
    };
    let matrix = KeyMatrix::new(
        BoardMatrix { mux, columns },
        hardware.columns,
        hardware.mux_bits,
        order,
    )
    .unwrap();

    let mut rotary = Rotary::new(RotaryPins {
        a: Input::new(p.PIN_20, Pull::Up),
        b: Input::new(p.PIN_21, Pull::Up),
        click: Input::new(p.PIN_24, Pull::Up),
    });
    rotary.invert_direction(hardware.invert_rotary);

    let piezo = Pwm::new_output_b(p.PWM_SLICE3, p.PIN_23, audio_pwm_config());
    let jack = Pwm::new_output_b(p.PWM_SLICE4, p.PIN_25, audio_pwm_config());

    let (producer, consumer) = SAMPLES.init(SampleQueue::new()).split();
    let audio = AudioOut::new(
        consumer,
        [
            PwmLevel::new(piezo, audio_pwm_config()),
            PwmLevel::new(jack, audio_pwm_config()),
        ],
    );

    // —— Scheduler ——————————————————————————————————————————————————————————

    let tick_us = hardware.tick_us();
    let mut scheduler = Scheduler::new(tick_us).unwrap();
    scheduler.register(hardware.audio_period_us(), Job::Audio).unwrap();
    scheduler.register(hardware.rotary_period_us, Job::Rotary).unwrap();
    scheduler.register(tick_us, Job::Scan).unwrap();
    info!(
        "tick {}us, audio {}Hz, {} keys",
        tick_us,
        hardware.actual_sample_rate_hz(),
        hardware.key_count()
    );

    // —— Control context ————————————————————————————————————————————————————

    let board = BOARD.init(Hexboard::new(config).unwrap());
    let mut boot_midi = MidiBatch::new();
    load_boot_layout(board, &mut boot_midi);
    flush_midi(&mut boot_midi);

    // —— USB MIDI ———————————————————————————————————————————————————————————

    let driver = Driver::new(p.USB, Irqs);
    let mut usb_config = embassy_usb::Config::new(0x1209, 0x4858);
    usb_config.manufacturer = Some("Shapes in Sound");
    usb_config.product = Some("HexBoard MIDI Controller");
    usb_config.max_power = 100;

    static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
    static CONTROL_BUFFER: StaticCell<[u8; 64]> = StaticCell::new();

    let mut builder = Builder::new(
        driver,
        usb_config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        &mut [],
        CONTROL_BUFFER.init([0; 64]),
    );
    let class = MidiClass::new(&mut builder, 1, 1, 64);
    let usb = builder.build();

    // —— Serial MIDI ————————————————————————————————————————————————————————

    let mut uart_config = uart::Config::default();
    uart_config.baudrate = SERIAL_MIDI_BAUD;
    let midi_uart = UartTx::new(p.UART0, p.PIN_0, p.DMA_CH0, uart_config);

    // —— Start the alarm ————————————————————————————————————————————————————

    BACKGROUND.lock(|cell| {
        cell.replace(Some(Background {
            scheduler,
            alarm: TimerAlarm { tick_us, target: 0 },
            matrix,
            rotary,
            audio,
        }))
    });
    interrupt::TIMER0_IRQ_1.set_priority(Priority::P1);
    // SAFETY: the handler only touches BACKGROUND, which is initialised above.
    unsafe { interrupt::TIMER0_IRQ_1.enable() };
    with_background(|bg| bg.scheduler.start(&mut bg.alarm))
        .unwrap()
        .unwrap();

    // —— Spawn tasks ————————————————————————————————————————————————————————

    spawner.spawn(usb_task(usb)).unwrap();
    spawner.spawn(midi_task(class)).unwrap();
    spawner.spawn(serial_midi_task(midi_uart)).unwrap();
    spawner.spawn(control_task(board, producer)).unwrap();

    info!("All tasks spawned");
}
