//! eframe/egui window backend.
//!
//! The presenter thread renders into a shared latest-frame slot and asks the
//! window to repaint; the window uploads the frame into a texture on its own
//! thread and forwards keyboard input to the control channel.

use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::control::{ControlEvent, SEEK_STEP_LARGE, SEEK_STEP_SMALL};
use crate::display::{DisplayFrame, VideoOutput};
use crate::error::{Error, Result};

struct SlotInner {
    frame: Option<DisplayFrame>,
    ctx: Option<egui::Context>,
}

/// Latest-presented-frame slot shared between the presenter thread and the
/// window.
#[derive(Clone)]
pub struct FrameSlot {
    inner: Arc<Mutex<SlotInner>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SlotInner {
                frame: None,
                ctx: None,
            })),
        }
    }

    fn install_ctx(&self, ctx: egui::Context) {
        self.inner.lock().ctx = Some(ctx);
    }

    fn publish(&self, frame: DisplayFrame) {
        let ctx = {
            let mut inner = self.inner.lock();
            inner.frame = Some(frame);
            inner.ctx.clone()
        };
        if let Some(ctx) = ctx {
            ctx.request_repaint();
        }
    }

    fn take(&self) -> Option<DisplayFrame> {
        self.inner.lock().frame.take()
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Presenter-side half of the window: `render` stages the frame, `present`
/// makes it the window's current picture.
pub struct WindowOutput {
    slot: FrameSlot,
    pending: Option<DisplayFrame>,
}

impl WindowOutput {
    pub fn new(slot: FrameSlot) -> Self {
        Self {
            slot,
            pending: None,
        }
    }
}

impl VideoOutput for WindowOutput {
    fn render(&mut self, frame: DisplayFrame) -> Result<()> {
        self.pending = Some(frame);
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        if let Some(frame) = self.pending.take() {
            self.slot.publish(frame);
        }
        Ok(())
    }
}

struct PlayerApp {
    slot: FrameSlot,
    events: Sender<ControlEvent>,
    texture: Option<egui::TextureHandle>,
}

impl PlayerApp {
    fn forward_keys(&self, ctx: &egui::Context) {
        use egui::Key;

        let keys: [(Key, ControlEvent); 8] = [
            (Key::Space, ControlEvent::TogglePause),
            (Key::M, ControlEvent::ToggleMute),
            (Key::ArrowLeft, ControlEvent::SeekBy(-SEEK_STEP_SMALL)),
            (Key::ArrowRight, ControlEvent::SeekBy(SEEK_STEP_SMALL)),
            (Key::ArrowDown, ControlEvent::SeekBy(-SEEK_STEP_LARGE)),
            (Key::ArrowUp, ControlEvent::SeekBy(SEEK_STEP_LARGE)),
            (Key::PageUp, ControlEvent::VolumeUp),
            (Key::PageDown, ControlEvent::VolumeDown),
        ];
        for (key, event) in keys {
            if ctx.input(|i| i.key_pressed(key)) {
                let _ = self.events.send(event);
            }
        }

        if ctx.input(|i| i.key_pressed(Key::Q) || i.key_pressed(Key::Escape)) {
            let _ = self.events.send(ControlEvent::Quit);
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }
}

impl eframe::App for PlayerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.forward_keys(ctx);

        if let Some(frame) = self.slot.take() {
            let image = egui::ColorImage::from_rgba_unmultiplied(
                [frame.width as usize, frame.height as usize],
                &frame.data,
            );
            match &mut self.texture {
                Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
                None => {
                    self.texture =
                        Some(ctx.load_texture("video", image, egui::TextureOptions::LINEAR));
                }
            }
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                if let Some(texture) = &self.texture {
                    let sized = egui::load::SizedTexture::from_handle(texture);
                    ui.centered_and_justified(|ui| {
                        ui.add(
                            egui::Image::from_texture(sized)
                                .maintain_aspect_ratio(true)
                                .fit_to_exact_size(ui.available_size()),
                        );
                    });
                }
            });

        // Safety net in case a presenter repaint request is missed.
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

/// Run the player window on the calling thread until the user closes it.
pub fn run(
    title: &str,
    width: u32,
    height: u32,
    slot: FrameSlot,
    events: Sender<ControlEvent>,
) -> Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(title)
            .with_inner_size([width as f32, height as f32]),
        ..Default::default()
    };

    let app_slot = slot.clone();
    eframe::run_native(
        title,
        options,
        Box::new(move |cc| {
            app_slot.install_ctx(cc.egui_ctx.clone());
            Ok(Box::new(PlayerApp {
                slot: app_slot.clone(),
                events,
                texture: None,
            }))
        }),
    )
    .map_err(|err| Error::VideoOutput(err.to_string()))
}
