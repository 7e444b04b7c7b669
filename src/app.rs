use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use eframe::egui::{self, ColorImage, Key, TextureHandle, TextureOptions};

use crate::audio::AudioOutput;
use crate::nes::{
    BUTTON_A, BUTTON_B, BUTTON_DOWN, BUTTON_LEFT, BUTTON_RIGHT, BUTTON_SELECT, BUTTON_START,
    BUTTON_UP, FRAME_HEIGHT, FRAME_WIDTH, Nes, NesError, Region,
};

const NTSC_FRAME_RATE_HZ: f64 = 60.098_813_897_440_515;
const PAL_FRAME_RATE_HZ: f64 = 50.006_977_968_268_29;
const FALLBACK_SAMPLE_RATE: u32 = 44_100;
const IDLE_REPAINT: Duration = Duration::from_millis(16);
const MAX_FRAMES_PER_UPDATE: u32 = 2;

fn frame_rate_for(region: Region) -> f64 {
    match region {
        Region::Ntsc => NTSC_FRAME_RATE_HZ,
        Region::Pal => PAL_FRAME_RATE_HZ,
    }
}

/// Paces emulated frames against the wall clock. The speed scale stretches
/// the frame interval; 100 is real time.
struct FrameClock {
    base_rate_hz: f64,
    speed_percent: u32,
    next_frame_at: Option<Instant>,
}

impl FrameClock {
    fn new(base_rate_hz: f64) -> Self {
        Self {
            base_rate_hz,
            speed_percent: 100,
            next_frame_at: None,
        }
    }

    fn interval(&self) -> Duration {
        Duration::from_secs_f64(100.0 / (self.base_rate_hz * self.speed_percent as f64))
    }

    fn set_speed(&mut self, percent: u32) {
        self.speed_percent = percent;
        self.next_frame_at = None;
    }

    fn restart(&mut self) {
        self.next_frame_at = None;
    }

    fn frame_due(&mut self, now: Instant) -> bool {
        let next = self.next_frame_at.get_or_insert(now);
        now >= *next
    }

    fn frame_ran(&mut self, now: Instant) {
        let interval = self.interval();
        let next = self.next_frame_at.get_or_insert(now);
        *next += interval;
        // After a long stall, resynchronize rather than bursting.
        if now > *next + interval {
            *next = now;
        }
    }

    fn time_until_due(&self, now: Instant) -> Duration {
        match self.next_frame_at {
            Some(next) => next.saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }
}

pub struct NesApp {
    nes: Option<Nes>,
    rom_path: Option<PathBuf>,
    frame_texture: Option<TextureHandle>,
    status_line: String,
    audio: Option<AudioOutput>,
    clock: FrameClock,
    paused: bool,
}

impl NesApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::dark());

        let audio = match AudioOutput::new() {
            Ok(audio) => Some(audio),
            Err(err) => {
                eprintln!("audio unavailable: {err:#}");
                None
            }
        };

        Self {
            nes: None,
            rom_path: None,
            frame_texture: None,
            status_line: "Drop a .nes file or click Open ROM".to_string(),
            audio,
            clock: FrameClock::new(NTSC_FRAME_RATE_HZ),
            paused: false,
        }
    }

    fn load_rom(&mut self, path: &Path) {
        self.save_battery();

        match Nes::from_path(path) {
            Ok(mut nes) => {
                let sample_rate = self
                    .audio
                    .as_ref()
                    .map(|audio| audio.sample_rate())
                    .unwrap_or(FALLBACK_SAMPLE_RATE);
                nes.set_audio_sample_rate(sample_rate);

                let save_path = battery_path(path);
                if let Ok(data) = fs::read(&save_path) {
                    nes.load_battery_ram(&data);
                }

                self.clock = FrameClock::new(frame_rate_for(nes.region()));
                self.status_line = format!(
                    "Loaded {} ({:?})",
                    path.file_name().and_then(|f| f.to_str()).unwrap_or("ROM"),
                    nes.region()
                );
                self.nes = Some(nes);
                self.rom_path = Some(path.to_path_buf());
                self.frame_texture = None;
                self.paused = false;
            }
            Err(err) => {
                self.status_line = format!("Failed to load ROM: {err}");
            }
        }
    }

    fn save_battery(&self) {
        let (Some(nes), Some(path)) = (self.nes.as_ref(), self.rom_path.as_ref()) else {
            return;
        };
        let Some(ram) = nes.battery_ram() else {
            return;
        };
        if let Err(err) = fs::write(battery_path(path), ram) {
            eprintln!("failed to write battery RAM: {err}");
        }
    }

    fn open_rom_dialog(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("NES ROM", &["nes"])
            .set_title("Open NES ROM")
            .pick_file()
        {
            self.load_rom(&path);
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|input| input.raw.dropped_files.clone());
        for file in dropped {
            if let Some(path) = file.path {
                let is_nes = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("nes"))
                    .unwrap_or(false);

                if is_nes {
                    self.load_rom(&path);
                } else {
                    self.status_line = format!("Unsupported file: {}", path.display());
                }
            }
        }
    }

    /// Driver events: pause, reset, quit, renderer toggles and speed scale.
    fn handle_driver_events(&mut self, ctx: &egui::Context) -> Result<(), NesError> {
        if ctx.input(|i| i.viewport().close_requested() || i.key_pressed(Key::Escape)) {
            return Err(NesError::InputClosed);
        }

        if ctx.input(|i| i.modifiers.command && i.key_pressed(Key::O)) {
            self.open_rom_dialog();
        }

        if ctx.input(|i| i.key_pressed(Key::P)) && self.nes.is_some() {
            self.paused = !self.paused;
            self.clock.restart();
        }

        if ctx.input(|i| i.key_pressed(Key::R))
            && let Some(nes) = self.nes.as_mut()
        {
            nes.reset();
            self.clock.restart();
            self.status_line = "Reset".to_string();
        }

        if let Some(nes) = self.nes.as_mut() {
            if ctx.input(|i| i.key_pressed(Key::B)) {
                let show = !nes.show_background();
                nes.set_show_background(show);
            }
            if ctx.input(|i| i.key_pressed(Key::V)) {
                let show = !nes.show_sprites();
                nes.set_show_sprites(show);
            }
        }

        for (key, percent) in [
            (Key::Num1, 25),
            (Key::Num2, 50),
            (Key::Num3, 75),
            (Key::Num4, 100),
        ] {
            if ctx.input(|i| i.key_pressed(key)) {
                self.clock.set_speed(percent);
                self.status_line = format!("Speed {percent}%");
            }
        }

        Ok(())
    }

    fn controller_state_from_input(ctx: &egui::Context) -> u8 {
        let mut state = 0u8;

        ctx.input(|input| {
            if input.key_down(Key::W) || input.key_down(Key::ArrowUp) {
                state |= BUTTON_UP;
            }
            if input.key_down(Key::S) || input.key_down(Key::ArrowDown) {
                state |= BUTTON_DOWN;
            }
            if input.key_down(Key::A) || input.key_down(Key::ArrowLeft) {
                state |= BUTTON_LEFT;
            }
            if input.key_down(Key::D) || input.key_down(Key::ArrowRight) {
                state |= BUTTON_RIGHT;
            }
            if input.key_down(Key::Z) || input.key_down(Key::Space) {
                state |= BUTTON_A;
            }
            if input.key_down(Key::X) {
                state |= BUTTON_B;
            }
            if input.key_down(Key::Enter) {
                state |= BUTTON_START;
            }
            if input.modifiers.shift {
                state |= BUTTON_SELECT;
            }
        });

        state
    }

    fn run_due_frames(&mut self, ctx: &egui::Context, now: Instant) {
        let Some(nes) = self.nes.as_mut() else {
            return;
        };
        if self.paused || nes.halted() {
            return;
        }

        let max_queued = self
            .audio
            .as_ref()
            .map(|audio| audio.sample_rate() as usize / 20);

        let mut ran = 0u32;
        while ran < MAX_FRAMES_PER_UPDATE && self.clock.frame_due(Instant::now()) {
            if let (Some(audio), Some(limit)) = (self.audio.as_ref(), max_queued)
                && audio.queued_samples() > limit
            {
                break;
            }

            nes.set_controller_state(0, Self::controller_state_from_input(ctx));
            nes.run_frame();

            let samples = nes.take_audio_samples();
            if let Some(audio) = &self.audio {
                audio.push_samples(&samples);
            }

            self.clock.frame_ran(now);
            ran += 1;
        }
    }

    fn update_texture(&mut self, ctx: &egui::Context) {
        let Some(nes) = self.nes.as_ref() else {
            return;
        };
        let image =
            ColorImage::from_rgba_unmultiplied([FRAME_WIDTH, FRAME_HEIGHT], nes.frame_buffer());

        if let Some(texture) = self.frame_texture.as_mut() {
            texture.set(image, TextureOptions::NEAREST);
        } else {
            self.frame_texture =
                Some(ctx.load_texture("nes-frame", image, TextureOptions::NEAREST));
        }
    }

    fn shut_down(&mut self, ctx: &egui::Context) {
        self.save_battery();
        self.nes = None;
        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
    }
}

impl eframe::App for NesApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_dropped_files(ctx);

        if let Err(NesError::InputClosed) = self.handle_driver_events(ctx) {
            self.shut_down(ctx);
            return;
        }

        let now = Instant::now();
        self.run_due_frames(ctx, now);
        self.update_texture(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("Open ROM").clicked() {
                    self.open_rom_dialog();
                }

                let loaded = self.nes.is_some();
                if ui
                    .add_enabled(loaded, egui::Button::new("Reset (R)"))
                    .clicked()
                    && let Some(nes) = self.nes.as_mut()
                {
                    nes.reset();
                    self.clock.restart();
                }

                let pause_label = if self.paused { "Resume (P)" } else { "Pause (P)" };
                if ui
                    .add_enabled(loaded, egui::Button::new(pause_label))
                    .clicked()
                {
                    self.paused = !self.paused;
                    self.clock.restart();
                }

                if let Some(path) = &self.rom_path {
                    ui.separator();
                    ui.label(path.display().to_string());
                }
            });
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal_wrapped(|ui| {
                ui.label(&self.status_line);
                ui.separator();
                ui.label(format!("Speed {}%", self.clock.speed_percent));
                ui.separator();
                ui.label(
                    "WASD/arrows move, Z/Space=A, X=B, Enter=Start, Shift=Select, \
                     P=Pause, R=Reset, B/V=Layers, 1-4=Speed, Esc=Quit",
                );
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                let available = ui.available_size();
                let scale_x = (available.x / FRAME_WIDTH as f32).max(1.0);
                let scale_y = (available.y / FRAME_HEIGHT as f32).max(1.0);
                let scale = scale_x.min(scale_y).floor().max(1.0);
                let target = egui::vec2(FRAME_WIDTH as f32 * scale, FRAME_HEIGHT as f32 * scale);

                if let Some(texture) = &self.frame_texture {
                    ui.add(egui::Image::new(texture).fit_to_exact_size(target));
                }
            });
        });

        if self.nes.is_some() && !self.paused {
            ctx.request_repaint_after(self.clock.time_until_due(Instant::now()).min(IDLE_REPAINT));
        } else {
            ctx.request_repaint_after(IDLE_REPAINT);
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.save_battery();
    }
}

fn battery_path(rom_path: &Path) -> PathBuf {
    rom_path.with_extension("sav")
}
