use super::cartridge::Region;

const NTSC_CPU_CLOCK_HZ: f64 = 1_789_773.0;
const PAL_CPU_CLOCK_HZ: f64 = 1_662_607.0;
const DEFAULT_SAMPLE_RATE: u32 = 44_100;

const LENGTH_TABLE: [u8; 32] = [
    10, 254, 20, 2, 40, 4, 80, 6, 160, 8, 60, 10, 14, 12, 26, 14, 12, 16, 24, 18, 48, 20, 96, 22,
    192, 24, 72, 26, 16, 28, 32, 30,
];

const DUTY_TABLE: [[u8; 8]; 4] = [
    [0, 1, 0, 0, 0, 0, 0, 0],
    [0, 1, 1, 0, 0, 0, 0, 0],
    [0, 1, 1, 1, 1, 0, 0, 0],
    [1, 0, 0, 1, 1, 1, 1, 1],
];

const TRIANGLE_SEQUENCE: [u8; 32] = [
    15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11,
    12, 13, 14, 15,
];

const NOISE_PERIODS_NTSC: [u16; 16] = [
    4, 8, 16, 32, 64, 96, 128, 160, 202, 254, 380, 508, 762, 1016, 2034, 4068,
];

const NOISE_PERIODS_PAL: [u16; 16] = [
    4, 8, 14, 30, 60, 88, 118, 148, 188, 236, 354, 472, 708, 944, 1890, 3778,
];

const DMC_RATES_NTSC: [u16; 16] = [
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54,
];

const DMC_RATES_PAL: [u16; 16] = [
    398, 354, 316, 298, 276, 236, 210, 198, 176, 148, 132, 118, 98, 78, 66, 50,
];

// Frame counter step boundaries, in CPU cycles from sequencer reset.
const FC_STEP1: u32 = 7_457;
const FC_STEP2: u32 = 14_913;
const FC_STEP3: u32 = 22_371;
const FC_STEP4: u32 = 29_829;
const FC_4STEP_LEN: u32 = 29_830;
const FC_STEP5: u32 = 37_281;
const FC_5STEP_LEN: u32 = 37_282;

// First-order hi-pass accumulator coefficients (16.16 fixed point).
const HIPASS_STRONG: i64 = 225_574;
const HIPASS_WEAK: i64 = 57_593;

pub struct Apu {
    pulse1: Pulse,
    pulse2: Pulse,
    triangle: Triangle,
    noise: Noise,
    dmc: Dmc,

    frame_cycles: u32,
    five_step_mode: bool,
    irq_inhibit: bool,
    frame_irq: bool,
    frame_write_value: u8,
    frame_write_delay: u8,
    frame_write_pending: bool,

    cpu_cycle: u64,
    cpu_clock_hz: f64,
    sample_rate: u32,
    sample_clock: f64,
    samples: Vec<i16>,

    pulse_lut: [f64; 31],
    tnd_lut: [f64; 203],
    hipass_strong: i64,
    hipass_weak: i64,

    dmc_dma_request: Option<u16>,
}

impl Apu {
    pub fn new(region: Region) -> Self {
        let mut pulse_lut = [0.0; 31];
        for (i, entry) in pulse_lut.iter_mut().enumerate().skip(1) {
            *entry = 95.52 / (8128.0 / i as f64 + 100.0);
        }
        let mut tnd_lut = [0.0; 203];
        for (i, entry) in tnd_lut.iter_mut().enumerate().skip(1) {
            *entry = 163.67 / (24329.0 / i as f64 + 100.0);
        }

        let (cpu_clock_hz, noise_periods, dmc_rates) = match region {
            Region::Ntsc => (NTSC_CPU_CLOCK_HZ, &NOISE_PERIODS_NTSC, &DMC_RATES_NTSC),
            Region::Pal => (PAL_CPU_CLOCK_HZ, &NOISE_PERIODS_PAL, &DMC_RATES_PAL),
        };

        Self {
            pulse1: Pulse::new(true),
            pulse2: Pulse::new(false),
            triangle: Triangle::new(),
            noise: Noise::new(noise_periods),
            dmc: Dmc::new(dmc_rates),
            frame_cycles: 0,
            five_step_mode: false,
            irq_inhibit: false,
            frame_irq: false,
            frame_write_value: 0,
            frame_write_delay: 0,
            frame_write_pending: false,
            cpu_cycle: 0,
            cpu_clock_hz,
            sample_rate: DEFAULT_SAMPLE_RATE,
            sample_clock: 0.0,
            samples: Vec::with_capacity(2048),
            pulse_lut,
            tnd_lut,
            hipass_strong: 0,
            hipass_weak: 0,
            dmc_dma_request: None,
        }
    }

    pub fn reset(&mut self) {
        let noise_periods = self.noise.period_lut;
        let dmc_rates = self.dmc.rate_lut;
        self.pulse1 = Pulse::new(true);
        self.pulse2 = Pulse::new(false);
        self.triangle = Triangle::new();
        self.noise = Noise::new(noise_periods);
        self.dmc = Dmc::new(dmc_rates);
        self.frame_cycles = 0;
        self.five_step_mode = false;
        self.irq_inhibit = false;
        self.frame_irq = false;
        self.frame_write_pending = false;
        self.cpu_cycle = 0;
        self.sample_clock = 0.0;
        self.samples.clear();
        self.hipass_strong = 0;
        self.hipass_weak = 0;
        self.dmc_dma_request = None;
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(8_000);
    }

    pub fn write_register(&mut self, addr: u16, value: u8) {
        match addr {
            0x4000 => self.pulse1.write_control(value),
            0x4001 => self.pulse1.write_sweep(value),
            0x4002 => self.pulse1.write_timer_low(value),
            0x4003 => self.pulse1.write_timer_high(value),

            0x4004 => self.pulse2.write_control(value),
            0x4005 => self.pulse2.write_sweep(value),
            0x4006 => self.pulse2.write_timer_low(value),
            0x4007 => self.pulse2.write_timer_high(value),

            0x4008 => self.triangle.write_linear(value),
            0x400A => self.triangle.write_timer_low(value),
            0x400B => self.triangle.write_timer_high(value),

            0x400C => self.noise.write_control(value),
            0x400E => self.noise.write_period(value),
            0x400F => self.noise.write_length(value),

            0x4010 => self.dmc.write_control(value),
            0x4011 => self.dmc.write_output_level(value),
            0x4012 => self.dmc.write_sample_addr(value),
            0x4013 => self.dmc.write_sample_length(value),

            0x4015 => self.write_control(value),
            0x4017 => self.write_frame_counter(value),
            _ => {}
        }
    }

    pub fn read_status(&mut self) -> u8 {
        let mut status = 0u8;
        if self.pulse1.length > 0 {
            status |= 0x01;
        }
        if self.pulse2.length > 0 {
            status |= 0x02;
        }
        if self.triangle.length > 0 {
            status |= 0x04;
        }
        if self.noise.length > 0 {
            status |= 0x08;
        }
        if self.dmc.playback_active() {
            status |= 0x10;
        }
        if self.frame_irq {
            status |= 0x40;
        }
        if self.dmc.irq_flag {
            status |= 0x80;
        }

        self.frame_irq = false;
        status
    }

    pub fn irq_pending(&self) -> bool {
        self.frame_irq || self.dmc.irq_flag
    }

    /// One CPU cycle of APU time. Pulse and noise timers run at half the CPU
    /// rate, triangle and DMC at the full rate.
    pub fn tick(&mut self) {
        self.cpu_cycle = self.cpu_cycle.wrapping_add(1);

        if self.frame_write_pending {
            if self.frame_write_delay > 0 {
                self.frame_write_delay -= 1;
            }
            if self.frame_write_delay == 0 {
                self.frame_write_pending = false;
                self.apply_frame_counter_write(self.frame_write_value);
            }
        }

        if (self.cpu_cycle & 1) == 0 {
            self.pulse1.clock_timer();
            self.pulse2.clock_timer();
            self.noise.clock_timer();
        }
        self.triangle.clock_timer();
        self.dmc.clock_timer();
        if self.dmc.wants_dma() && self.dmc_dma_request.is_none() {
            self.dmc_dma_request = Some(self.dmc.current_addr);
        }

        self.clock_frame_counter();

        self.sample_clock += self.sample_rate as f64;
        while self.sample_clock >= self.cpu_clock_hz {
            self.sample_clock -= self.cpu_clock_hz;
            let sample = self.mix();
            self.samples.push(sample);
        }
    }

    pub fn take_samples(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.samples)
    }

    pub fn take_dmc_dma_request(&mut self) -> Option<u16> {
        self.dmc_dma_request.take()
    }

    pub fn complete_dmc_dma(&mut self, value: u8) {
        self.dmc.load_sample_byte(value);
        if self.dmc.wants_dma() && self.dmc_dma_request.is_none() {
            self.dmc_dma_request = Some(self.dmc.current_addr);
        }
    }

    fn write_control(&mut self, value: u8) {
        // Any $4015 write acknowledges a pending DMC IRQ.
        self.dmc.irq_flag = false;

        self.pulse1.set_enabled((value & 0x01) != 0);
        self.pulse2.set_enabled((value & 0x02) != 0);
        self.triangle.set_enabled((value & 0x04) != 0);
        self.noise.set_enabled((value & 0x08) != 0);

        self.dmc.enabled = (value & 0x10) != 0;
        if !self.dmc.enabled {
            self.dmc.bytes_remaining = 0;
        } else if !self.dmc.playback_active() {
            self.dmc.restart_sample();
            if self.dmc.wants_dma() && self.dmc_dma_request.is_none() {
                self.dmc_dma_request = Some(self.dmc.current_addr);
            }
        }
    }

    fn write_frame_counter(&mut self, value: u8) {
        if (value & 0x40) != 0 {
            self.frame_irq = false;
        }
        // The write lands 3 or 4 CPU cycles later depending on write parity.
        self.frame_write_value = value;
        self.frame_write_delay = if (self.cpu_cycle & 1) == 0 { 3 } else { 4 };
        self.frame_write_pending = true;
    }

    fn apply_frame_counter_write(&mut self, value: u8) {
        self.five_step_mode = (value & 0x80) != 0;
        self.irq_inhibit = (value & 0x40) != 0;
        if self.irq_inhibit {
            self.frame_irq = false;
        }
        self.frame_cycles = 0;
        if self.five_step_mode {
            self.clock_quarter_frame();
            self.clock_half_frame();
        }
    }

    fn clock_frame_counter(&mut self) {
        self.frame_cycles = self.frame_cycles.wrapping_add(1);

        if self.five_step_mode {
            match self.frame_cycles {
                FC_STEP1 | FC_STEP3 => self.clock_quarter_frame(),
                FC_STEP2 | FC_STEP5 => {
                    self.clock_quarter_frame();
                    self.clock_half_frame();
                }
                FC_5STEP_LEN => self.frame_cycles = 0,
                _ => {}
            }
        } else {
            match self.frame_cycles {
                FC_STEP1 | FC_STEP3 => self.clock_quarter_frame(),
                FC_STEP2 => {
                    self.clock_quarter_frame();
                    self.clock_half_frame();
                }
                FC_STEP4 => {
                    self.clock_quarter_frame();
                    self.clock_half_frame();
                    if !self.irq_inhibit {
                        self.frame_irq = true;
                    }
                }
                FC_4STEP_LEN => {
                    if !self.irq_inhibit {
                        self.frame_irq = true;
                    }
                    self.frame_cycles = 0;
                }
                _ => {}
            }
        }
    }

    fn clock_quarter_frame(&mut self) {
        self.pulse1.envelope.clock();
        self.pulse2.envelope.clock();
        self.triangle.clock_linear_counter();
        self.noise.envelope.clock();
    }

    fn clock_half_frame(&mut self) {
        self.pulse1.clock_length_and_sweep();
        self.pulse2.clock_length_and_sweep();
        self.triangle.clock_length_counter();
        self.noise.clock_length_counter();
    }

    fn mix(&mut self) -> i16 {
        let pulse_in = (self.pulse1.output() + self.pulse2.output()) as usize;
        let tnd_in = 3 * self.triangle.output() as usize
            + 2 * self.noise.output() as usize
            + self.dmc.output_level as usize;

        let mixed = self.pulse_lut[pulse_in] + self.tnd_lut[tnd_in];
        let sample = (mixed * 40000.0) as i16;
        let sample = hipass(&mut self.hipass_strong, HIPASS_STRONG, sample);
        hipass(&mut self.hipass_weak, HIPASS_WEAK, sample)
    }
}

fn hipass(accumulator: &mut i64, coefficient: i64, sample: i16) -> i16 {
    *accumulator += (((sample as i64) << 16) - (*accumulator >> 16)) * coefficient >> 16;
    (sample as i64 - (*accumulator >> 32)) as i16
}

/// Shared envelope generator: constant volume or a 15-to-0 decay with
/// optional looping, clocked on quarter frames.
#[derive(Clone, Copy, Default)]
struct Envelope {
    start: bool,
    looping: bool,
    constant: bool,
    period: u8,
    divider: u8,
    decay: u8,
}

impl Envelope {
    fn write_control(&mut self, value: u8) {
        self.looping = (value & 0x20) != 0;
        self.constant = (value & 0x10) != 0;
        self.period = value & 0x0F;
    }

    fn clock(&mut self) {
        if self.start {
            self.start = false;
            self.decay = 15;
            self.divider = self.period;
            return;
        }

        if self.divider == 0 {
            self.divider = self.period;
            if self.decay > 0 {
                self.decay -= 1;
            } else if self.looping {
                self.decay = 15;
            }
        } else {
            self.divider -= 1;
        }
    }

    fn volume(&self) -> u8 {
        if self.constant { self.period } else { self.decay }
    }
}

struct Pulse {
    enabled: bool,
    is_pulse1: bool,
    duty: u8,
    duty_step: u8,
    timer_period: u16,
    timer: u16,
    length: u8,
    envelope: Envelope,
    sweep_enabled: bool,
    sweep_period: u8,
    sweep_negate: bool,
    sweep_shift: u8,
    sweep_reload: bool,
    sweep_divider: u8,
}

impl Pulse {
    fn new(is_pulse1: bool) -> Self {
        Self {
            enabled: false,
            is_pulse1,
            duty: 0,
            duty_step: 0,
            timer_period: 0,
            timer: 0,
            length: 0,
            envelope: Envelope::default(),
            sweep_enabled: false,
            sweep_period: 1,
            sweep_negate: false,
            sweep_shift: 0,
            sweep_reload: false,
            sweep_divider: 0,
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.length = 0;
        }
    }

    fn write_control(&mut self, value: u8) {
        self.duty = value >> 6;
        self.envelope.write_control(value);
        self.envelope.start = true;
    }

    fn write_sweep(&mut self, value: u8) {
        self.sweep_enabled = (value & 0x80) != 0;
        self.sweep_period = ((value >> 4) & 0x07) + 1;
        self.sweep_negate = (value & 0x08) != 0;
        self.sweep_shift = value & 0x07;
        self.sweep_reload = true;
    }

    fn write_timer_low(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0xFF00) | value as u16;
    }

    fn write_timer_high(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0x00FF) | (((value & 0x07) as u16) << 8);
        if self.enabled {
            self.length = LENGTH_TABLE[(value >> 3) as usize];
        }
        self.duty_step = 0;
        self.envelope.start = true;
    }

    fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            self.duty_step = (self.duty_step + 1) & 0x07;
        } else {
            self.timer -= 1;
        }
    }

    fn clock_length_and_sweep(&mut self) {
        if !self.envelope.looping && self.length > 0 {
            self.length -= 1;
        }

        if self.sweep_reload {
            if self.sweep_enabled && self.sweep_divider == 0 {
                self.apply_sweep();
            }
            self.sweep_divider = self.sweep_period;
            self.sweep_reload = false;
        } else if self.sweep_divider == 0 {
            if self.sweep_enabled {
                self.apply_sweep();
            }
            self.sweep_divider = self.sweep_period;
        } else {
            self.sweep_divider -= 1;
        }
    }

    fn apply_sweep(&mut self) {
        if self.sweep_shift == 0 {
            return;
        }
        let target = self.target_period();
        if target <= 0x07FF && self.timer_period >= 8 {
            self.timer_period = target;
        }
    }

    fn target_period(&self) -> u16 {
        let change = self.timer_period >> self.sweep_shift;
        if self.sweep_negate {
            // Pulse 1's adder is one's-complement: it subtracts one extra.
            let extra = u16::from(self.is_pulse1);
            self.timer_period.wrapping_sub(change + extra)
        } else {
            self.timer_period.wrapping_add(change)
        }
    }

    fn output(&self) -> u8 {
        if !self.enabled || self.length == 0 {
            return 0;
        }
        if DUTY_TABLE[self.duty as usize][self.duty_step as usize] == 0 {
            return 0;
        }
        if self.timer_period < 8 || (self.sweep_shift != 0 && self.target_period() > 0x07FF) {
            return 0;
        }
        self.envelope.volume()
    }
}

struct Triangle {
    enabled: bool,
    control: bool,
    linear_reload_value: u8,
    linear_counter: u8,
    linear_reload: bool,
    timer_period: u16,
    timer: u16,
    length: u8,
    step: u8,
}

impl Triangle {
    fn new() -> Self {
        Self {
            enabled: false,
            control: false,
            linear_reload_value: 0,
            linear_counter: 0,
            linear_reload: false,
            timer_period: 0,
            timer: 0,
            length: 0,
            step: 0,
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.length = 0;
        }
    }

    fn write_linear(&mut self, value: u8) {
        self.control = (value & 0x80) != 0;
        self.linear_reload_value = value & 0x7F;
    }

    fn write_timer_low(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0xFF00) | value as u16;
    }

    fn write_timer_high(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0x00FF) | (((value & 0x07) as u16) << 8);
        if self.enabled {
            self.length = LENGTH_TABLE[(value >> 3) as usize];
        }
        self.linear_reload = true;
    }

    fn clock_linear_counter(&mut self) {
        if self.linear_reload {
            self.linear_counter = self.linear_reload_value;
        } else if self.linear_counter > 0 {
            self.linear_counter -= 1;
        }
        if !self.control {
            self.linear_reload = false;
        }
    }

    fn clock_length_counter(&mut self) {
        if !self.control && self.length > 0 {
            self.length -= 1;
        }
    }

    fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            if self.length > 0 && self.linear_counter > 0 && self.timer_period > 1 {
                self.step = (self.step + 1) & 0x1F;
            }
        } else {
            self.timer -= 1;
        }
    }

    fn output(&self) -> u8 {
        if !self.enabled || self.length == 0 || self.linear_counter == 0 || self.timer_period < 2
        {
            0
        } else {
            TRIANGLE_SEQUENCE[self.step as usize]
        }
    }
}

struct Noise {
    enabled: bool,
    envelope: Envelope,
    mode: bool,
    timer_period: u16,
    timer: u16,
    shift: u16,
    length: u8,
    period_lut: &'static [u16; 16],
}

impl Noise {
    fn new(period_lut: &'static [u16; 16]) -> Self {
        Self {
            enabled: false,
            envelope: Envelope::default(),
            mode: false,
            timer_period: period_lut[0],
            timer: 0,
            shift: 0x0001,
            length: 0,
            period_lut,
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.length = 0;
        }
    }

    fn write_control(&mut self, value: u8) {
        self.envelope.write_control(value);
        self.envelope.start = true;
    }

    fn write_period(&mut self, value: u8) {
        self.mode = (value & 0x80) != 0;
        self.timer_period = self.period_lut[(value & 0x0F) as usize];
    }

    fn write_length(&mut self, value: u8) {
        if self.enabled {
            self.length = LENGTH_TABLE[(value >> 3) as usize];
        }
        self.envelope.start = true;
    }

    fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            self.clock_shift_register();
        } else {
            self.timer -= 1;
        }
    }

    fn clock_shift_register(&mut self) {
        let tap = if self.mode { 6 } else { 1 };
        let feedback = (self.shift ^ (self.shift >> tap)) & 0x0001;
        self.shift = (self.shift >> 1) | (feedback << 14);
    }

    fn clock_length_counter(&mut self) {
        if !self.envelope.looping && self.length > 0 {
            self.length -= 1;
        }
    }

    fn output(&self) -> u8 {
        if !self.enabled || self.length == 0 || (self.shift & 0x0001) != 0 {
            0
        } else {
            self.envelope.volume()
        }
    }
}

struct Dmc {
    enabled: bool,
    irq_enabled: bool,
    irq_flag: bool,
    loop_flag: bool,
    timer_period: u16,
    timer: u16,
    output_level: u8,
    sample_addr: u8,
    sample_length: u8,
    current_addr: u16,
    bytes_remaining: u16,
    sample_buffer: Option<u8>,
    shift: u8,
    bits_remaining: u8,
    silence: bool,
    rate_lut: &'static [u16; 16],
}

impl Dmc {
    fn new(rate_lut: &'static [u16; 16]) -> Self {
        Self {
            enabled: false,
            irq_enabled: false,
            irq_flag: false,
            loop_flag: false,
            timer_period: rate_lut[0],
            timer: rate_lut[0],
            output_level: 0,
            sample_addr: 0,
            sample_length: 0,
            current_addr: 0xC000,
            bytes_remaining: 0,
            sample_buffer: None,
            shift: 0,
            bits_remaining: 8,
            silence: true,
            rate_lut,
        }
    }

    fn write_control(&mut self, value: u8) {
        self.irq_enabled = (value & 0x80) != 0;
        if !self.irq_enabled {
            self.irq_flag = false;
        }
        self.loop_flag = (value & 0x40) != 0;
        self.timer_period = self.rate_lut[(value & 0x0F) as usize];
    }

    fn write_output_level(&mut self, value: u8) {
        self.output_level = value & 0x7F;
    }

    fn write_sample_addr(&mut self, value: u8) {
        self.sample_addr = value;
    }

    fn write_sample_length(&mut self, value: u8) {
        self.sample_length = value;
    }

    fn restart_sample(&mut self) {
        self.current_addr = 0xC000 | ((self.sample_addr as u16) << 6);
        self.bytes_remaining = ((self.sample_length as u16) << 4) | 0x0001;
    }

    fn playback_active(&self) -> bool {
        self.bytes_remaining > 0 || self.sample_buffer.is_some()
    }

    fn wants_dma(&self) -> bool {
        self.enabled && self.sample_buffer.is_none() && self.bytes_remaining > 0
    }

    fn load_sample_byte(&mut self, value: u8) {
        self.sample_buffer = Some(value);
        self.current_addr = if self.current_addr == 0xFFFF {
            0x8000
        } else {
            self.current_addr + 1
        };
        self.bytes_remaining -= 1;
        if self.bytes_remaining == 0 {
            if self.loop_flag {
                self.restart_sample();
            } else if self.irq_enabled {
                self.irq_flag = true;
            }
        }
    }

    fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
        }
        self.timer -= 1;
        if self.timer == 0 {
            self.clock_output_unit();
        }
    }

    fn clock_output_unit(&mut self) {
        if !self.silence {
            if (self.shift & 0x01) != 0 {
                if self.output_level <= 125 {
                    self.output_level += 2;
                }
            } else if self.output_level >= 2 {
                self.output_level -= 2;
            }
        }
        self.shift >>= 1;
        self.bits_remaining -= 1;

        if self.bits_remaining == 0 {
            self.bits_remaining = 8;
            if let Some(byte) = self.sample_buffer.take() {
                self.shift = byte;
                self.silence = false;
            } else {
                self.silence = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ntsc_apu() -> Apu {
        Apu::new(Region::Ntsc)
    }

    #[test]
    fn noise_lfsr_mode0_period_is_32767() {
        let mut noise = Noise::new(&NOISE_PERIODS_NTSC);
        assert_eq!(noise.shift, 0x0001);
        let mut steps = 0u32;
        loop {
            noise.clock_shift_register();
            steps += 1;
            if noise.shift == 0x0001 {
                break;
            }
            assert!(steps <= 40_000, "sequence did not close");
        }
        assert_eq!(steps, 32_767);
    }

    #[test]
    fn noise_lfsr_mode1_period_is_93() {
        let mut noise = Noise::new(&NOISE_PERIODS_NTSC);
        noise.mode = true;
        let mut steps = 0u32;
        loop {
            noise.clock_shift_register();
            steps += 1;
            if noise.shift == 0x0001 {
                break;
            }
            assert!(steps <= 1_000, "sequence did not close");
        }
        assert_eq!(steps, 93);
    }

    #[test]
    fn frame_irq_raised_and_cleared_by_status_read() {
        let mut apu = ntsc_apu();
        for _ in 0..FC_4STEP_LEN {
            apu.tick();
        }
        assert!(apu.irq_pending());
        let status = apu.read_status();
        assert_eq!(status & 0x40, 0x40);
        let status = apu.read_status();
        assert_eq!(status & 0x40, 0);
        assert!(!apu.irq_pending());
    }

    #[test]
    fn irq_inhibit_suppresses_frame_irq() {
        let mut apu = ntsc_apu();
        apu.write_register(0x4017, 0x40);
        for _ in 0..FC_4STEP_LEN + 8 {
            apu.tick();
        }
        assert!(!apu.irq_pending());
    }

    #[test]
    fn five_step_mode_never_raises_frame_irq() {
        let mut apu = ntsc_apu();
        apu.write_register(0x4017, 0x80);
        for _ in 0..FC_5STEP_LEN + 8 {
            apu.tick();
        }
        assert!(!apu.irq_pending());
    }

    #[test]
    fn length_counter_loads_and_channel_enable_gates_it() {
        let mut apu = ntsc_apu();
        apu.write_register(0x4015, 0x01);
        apu.write_register(0x4003, 0x00); // length index 0 -> 10
        assert_eq!(apu.pulse1.length, 10);
        assert_eq!(apu.read_status() & 0x01, 0x01);

        apu.write_register(0x4015, 0x00);
        assert_eq!(apu.pulse1.length, 0);
        assert_eq!(apu.read_status() & 0x01, 0);

        // Disabled channel refuses new length loads.
        apu.write_register(0x4003, 0x00);
        assert_eq!(apu.pulse1.length, 0);
    }

    #[test]
    fn pulse_mutes_below_period_8_and_on_sweep_overflow() {
        let mut apu = ntsc_apu();
        apu.write_register(0x4015, 0x01);
        apu.write_register(0x4000, 0x3F); // duty 0, halt, constant volume 15
        apu.write_register(0x4002, 0x04); // period 4: muted
        apu.write_register(0x4003, 0x00);
        apu.pulse1.duty_step = 1; // duty 0 is high on step 1
        assert_eq!(apu.pulse1.output(), 0);

        apu.write_register(0x4002, 0xFF);
        apu.write_register(0x4003, 0x07); // period 0x7FF
        apu.write_register(0x4001, 0x01); // sweep shift 1, add mode: target overflows
        apu.pulse1.duty_step = 1;
        assert_eq!(apu.pulse1.output(), 0);

        apu.write_register(0x4002, 0x40); // period 0x40: audible
        apu.write_register(0x4003, 0x00);
        apu.pulse1.duty_step = 1;
        assert_eq!(apu.pulse1.output(), 15);
    }

    #[test]
    fn pulse1_sweep_negate_subtracts_one_extra() {
        let mut pulse1 = Pulse::new(true);
        let mut pulse2 = Pulse::new(false);
        for pulse in [&mut pulse1, &mut pulse2] {
            pulse.timer_period = 0x100;
            pulse.sweep_negate = true;
            pulse.sweep_shift = 2;
        }
        assert_eq!(pulse1.target_period(), 0x100 - 0x40 - 1);
        assert_eq!(pulse2.target_period(), 0x100 - 0x40);
    }

    #[test]
    fn triangle_linear_counter_reload_and_decrement() {
        let mut apu = ntsc_apu();
        apu.write_register(0x4015, 0x04);
        apu.write_register(0x4008, 0x05); // control clear, reload 5
        apu.write_register(0x400B, 0x00); // sets reload flag + length

        apu.clock_quarter_frame();
        assert_eq!(apu.triangle.linear_counter, 5);
        // Reload flag cleared because control is clear; next clock decrements.
        apu.clock_quarter_frame();
        assert_eq!(apu.triangle.linear_counter, 4);
    }

    #[test]
    fn triangle_sequencer_needs_both_counters() {
        let mut tri = Triangle::new();
        tri.enabled = true;
        tri.timer_period = 4;
        tri.length = 2;
        tri.linear_counter = 0;
        let before = tri.step;
        for _ in 0..10 {
            tri.clock_timer();
        }
        assert_eq!(tri.step, before);

        tri.linear_counter = 1;
        for _ in 0..5 {
            tri.clock_timer();
        }
        assert_ne!(tri.step, before);
    }

    #[test]
    fn dmc_restart_addressing_and_irq() {
        let mut apu = ntsc_apu();
        apu.write_register(0x4010, 0x80); // IRQ enabled, no loop
        apu.write_register(0x4012, 0x04); // $C000 | (4 << 6) = $C100
        apu.write_register(0x4013, 0x01); // (1 << 4) | 1 = 17 bytes
        apu.write_register(0x4015, 0x10);

        assert_eq!(apu.take_dmc_dma_request(), Some(0xC100));
        apu.complete_dmc_dma(0xFF);
        assert_eq!(apu.dmc.bytes_remaining, 16);
        assert_eq!(apu.dmc.current_addr, 0xC101);

        // Drain the remaining bytes; the last one raises the IRQ.
        for i in 0..16 {
            apu.dmc.sample_buffer = None;
            apu.complete_dmc_dma(i);
        }
        assert!(apu.dmc.irq_flag);
        assert!(apu.irq_pending());
        assert_eq!(apu.read_status() & 0x80, 0x80);

        // $4015 write acknowledges the DMC IRQ.
        apu.write_register(0x4015, 0x00);
        assert!(!apu.irq_pending());
    }

    #[test]
    fn dmc_output_level_tracks_shift_bits() {
        let mut dmc = Dmc::new(&DMC_RATES_NTSC);
        dmc.output_level = 64;
        dmc.silence = false;
        dmc.shift = 0b0000_0011;
        dmc.bits_remaining = 8;
        for _ in 0..2 {
            dmc.clock_output_unit();
        }
        assert_eq!(dmc.output_level, 68);
        for _ in 0..2 {
            dmc.clock_output_unit();
        }
        assert_eq!(dmc.output_level, 64);
        // Clamps at the bottom.
        dmc.output_level = 1;
        dmc.shift = 0;
        dmc.bits_remaining = 8;
        dmc.clock_output_unit();
        assert_eq!(dmc.output_level, 1);
    }

    #[test]
    fn mixer_is_silent_with_all_channels_idle() {
        let mut apu = ntsc_apu();
        assert_eq!(apu.mix(), 0);
    }

    #[test]
    fn sampler_emits_near_host_rate() {
        let mut apu = ntsc_apu();
        apu.set_sample_rate(44_100);
        for _ in 0..NTSC_CPU_CLOCK_HZ as u32 {
            apu.tick();
        }
        let produced = apu.take_samples().len();
        assert!((44_099..=44_101).contains(&produced), "{produced}");
    }

    #[test]
    fn pal_region_selects_pal_noise_periods() {
        let apu = Apu::new(Region::Pal);
        assert_eq!(apu.noise.period_lut[2], 14);
        let apu = ntsc_apu();
        assert_eq!(apu.noise.period_lut[2], 16);
    }
}
