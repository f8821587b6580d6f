pub mod channel;
pub mod events;

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;

use crate::config::{ViewerConfig, parse_channel_patches};
use crate::filter::{FilterConfig, FilterError, FilterKind};
use crate::loader::{IoResponse, IoWorker};
use crate::media::Image;
use crate::pipeline::PipelineConfig;
use crate::render::RenderResult;
use crate::render::colormap::{PALETTE, parse_hex};
use crate::render::worker::{RenderTask, RenderWorker, WorkerOptions};
use channel::ChannelProperty;
use events::{EventBus, ListEvent, ListenerId, ModelEvent, ObservableList, Property};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("channel {index} out of range ({channels} channel(s))")]
    ChannelOutOfRange { index: usize, channels: usize },
    #[error("filter {index} out of range for channel {channel} ({filters} filter(s))")]
    FilterOutOfRange {
        channel: usize,
        index: usize,
        filters: usize,
    },
    #[error("invalid color '{0}'")]
    InvalidColor(String),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Copy)]
pub struct ModelOptions {
    pub prefer_gpu: bool,
    pub debug: bool,
    pub poll_interval: Duration,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            prefer_gpu: false,
            debug: false,
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Outcome of applying a saved configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Channels that received saved settings.
    pub applied: usize,
    /// Saved channels beyond the current image's channel count.
    pub truncated: usize,
    /// Unrecognized or malformed entries, as dotted paths.
    pub skipped_keys: Vec<String>,
}

/// Coordinator: owns the image and channel settings, feeds the render and IO
/// workers, and republishes their results as events.
///
/// Results are picked up by [`Model::poll`], which the host calls on a timer.
pub struct Model {
    options: ModelOptions,
    image: Option<Arc<Image>>,
    /// The next render task must carry the image.
    image_dirty: bool,
    filename: Option<PathBuf>,
    channels: ObservableList<ChannelProperty>,
    events: Rc<EventBus<ModelEvent>>,
    suspend_render: bool,
    pending_io: usize,
    last_render: Option<RenderResult>,
    last_io_error: Option<String>,
    clipboard: Option<ChannelProperty>,
    render_worker: RenderWorker,
    io_worker: IoWorker,
}

impl Model {
    pub fn new(options: ModelOptions) -> Self {
        let events = Rc::new(EventBus::new());
        let channels = ObservableList::new();
        let bus = Rc::clone(&events);
        channels
            .events()
            .subscribe(move |change: &ListEvent| bus.emit(&ModelEvent::ChannelsChanged(*change)));

        Self {
            options,
            image: None,
            image_dirty: false,
            filename: None,
            channels,
            events,
            suspend_render: false,
            pending_io: 0,
            last_render: None,
            last_io_error: None,
            clipboard: None,
            render_worker: RenderWorker::spawn(WorkerOptions {
                prefer_gpu: options.prefer_gpu,
                debug: options.debug,
            }),
            io_worker: IoWorker::spawn(),
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&ModelEvent) + 'static) -> ListenerId {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    pub fn image(&self) -> Option<&Arc<Image>> {
        self.image.as_ref()
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub fn channels(&self) -> &[ChannelProperty] {
        self.channels.items()
    }

    pub fn pending_io(&self) -> usize {
        self.pending_io
    }

    /// Most recent frame; stays in place when later frames fail.
    pub fn last_render(&self) -> Option<&RenderResult> {
        self.last_render.as_ref()
    }

    pub fn last_io_error(&self) -> Option<&str> {
        self.last_io_error.as_deref()
    }

    // ---- IO ----

    /// Queue an image load on the IO worker.
    pub fn open(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        log::info!("Opening {}", path.display());
        if self.io_worker.load_image(path) {
            self.pending_io += 1;
            self.events.emit(&ModelEvent::IoTaskStarted {
                pending: self.pending_io,
            });
        } else {
            log::warn!("IO worker unavailable");
        }
    }

    /// Install a new image. Channel settings are rebuilt from defaults and a
    /// single render is requested.
    pub fn update_image(&mut self, image: Arc<Image>) {
        let channels = (0..image.channels).map(ChannelProperty::new).collect();
        self.batch(|model| {
            model.image = Some(image);
            model.image_dirty = true;
            model.channels.replace_all(channels);
            model.events.emit(&ModelEvent::PropertyChanged(Property::Image));
        });
    }

    /// Swap the image's height and width axes, keeping channel settings.
    pub fn transpose_image(&mut self) -> bool {
        let Some(image) = &self.image else {
            return false;
        };
        self.image = Some(Arc::new(image.transposed()));
        self.image_dirty = true;
        self.events.emit(&ModelEvent::PropertyChanged(Property::Image));
        self.request_render();
        true
    }

    // ---- rendering ----

    /// Queue a render of the current state. The image is attached only if it
    /// changed since the last task.
    pub fn request_render(&mut self) {
        if self.suspend_render {
            return;
        }
        let Some(image) = &self.image else {
            return;
        };
        let task = RenderTask {
            channel_properties: self.channels.items().to_vec(),
            image: self.image_dirty.then(|| Arc::clone(image)),
        };
        if self.render_worker.submit(task) {
            self.image_dirty = false;
        } else {
            log::warn!("Render worker unavailable");
        }
    }

    /// Run `f` with automatic rendering suspended, then render once.
    fn batch(&mut self, f: impl FnOnce(&mut Self)) {
        let suspended = std::mem::replace(&mut self.suspend_render, true);
        f(self);
        self.suspend_render = suspended;
        self.request_render();
    }

    /// Collect worker results. Returns whether anything arrived.
    pub fn poll(&mut self) -> bool {
        let rendered = self.check_for_render();
        let loaded = self.check_for_io();
        rendered || loaded
    }

    fn check_for_render(&mut self) -> bool {
        match self.render_worker.try_recv() {
            Some(frame) => {
                self.last_render = Some(frame);
                self.events
                    .emit(&ModelEvent::PropertyChanged(Property::Render));
                true
            }
            None => false,
        }
    }

    fn check_for_io(&mut self) -> bool {
        let mut any = false;
        while let Some(response) = self.io_worker.try_recv() {
            any = true;
            self.pending_io = self.pending_io.saturating_sub(1);
            let ok = match response {
                IoResponse::ImageLoaded { path, image } => {
                    self.filename = Some(path);
                    self.last_io_error = None;
                    self.events
                        .emit(&ModelEvent::PropertyChanged(Property::Filename));
                    self.update_image(image);
                    true
                }
                IoResponse::Failed { path, error } => {
                    self.last_io_error = Some(format!("{}: {}", path.display(), error));
                    false
                }
                IoResponse::Stopped => continue,
            };
            self.events.emit(&ModelEvent::IoTaskFinished {
                pending: self.pending_io,
                ok,
            });
        }
        any
    }

    /// Poll until every queued load has answered or `timeout` passes.
    pub fn wait_for_io(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.poll();
            if self.pending_io == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(self.options.poll_interval);
        }
    }

    /// Poll until every submitted render task has been answered or `timeout`
    /// passes. The newest frame is then in [`Model::last_render`].
    pub fn wait_for_render(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.poll();
            if self.render_worker.pending() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(self.options.poll_interval);
        }
    }

    // ---- channel edits ----

    fn channel_count_error(&self, index: usize) -> ModelError {
        ModelError::ChannelOutOfRange {
            index,
            channels: self.channels.len(),
        }
    }

    fn edit_channel(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut ChannelProperty),
    ) -> Result<(), ModelError> {
        if !self.channels.update(index, f) {
            return Err(self.channel_count_error(index));
        }
        self.request_render();
        Ok(())
    }

    pub fn set_visible(&mut self, index: usize, visible: bool) -> Result<(), ModelError> {
        self.edit_channel(index, |p| p.visible = visible)
    }

    pub fn set_color(&mut self, index: usize, color: &str) -> Result<(), ModelError> {
        parse_hex(color).map_err(|_| ModelError::InvalidColor(color.to_string()))?;
        self.edit_channel(index, |p| p.color = color.to_string())
    }

    pub fn rename(&mut self, index: usize, name: &str) -> Result<(), ModelError> {
        self.edit_channel(index, |p| p.name = name.to_string())
    }

    /// Show `index` and hide every other channel.
    pub fn solo(&mut self, index: usize) -> Result<(), ModelError> {
        if index >= self.channels.len() {
            return Err(self.channel_count_error(index));
        }
        self.batch(|model| {
            for i in 0..model.channels.len() {
                model.channels.update(i, |p| p.visible = i == index);
            }
        });
        Ok(())
    }

    pub fn show_all(&mut self) {
        self.batch(|model| {
            for i in 0..model.channels.len() {
                model.channels.update(i, |p| p.visible = true);
            }
        });
    }

    /// Assign palette colors to channels in order, cycling.
    pub fn autocolor(&mut self) {
        self.batch(|model| {
            for i in 0..model.channels.len() {
                let color = PALETTE[i % PALETTE.len()];
                model.channels.update(i, |p| p.color = color.to_string());
            }
        });
    }

    /// Remember a channel's settings for [`Model::paste_params`].
    pub fn copy_params(&mut self, index: usize) -> Result<(), ModelError> {
        let prop = self
            .channels
            .get(index)
            .ok_or_else(|| self.channel_count_error(index))?;
        self.clipboard = Some(prop.clone());
        Ok(())
    }

    /// Apply copied settings except name, color and visibility. Returns false
    /// if nothing was copied.
    pub fn paste_params(&mut self, index: usize) -> Result<bool, ModelError> {
        let Some(pipeline) = self.clipboard.as_ref().map(|c| c.pipeline.clone()) else {
            return Ok(false);
        };
        self.set_pipeline(index, pipeline)?;
        Ok(true)
    }

    // ---- pipeline edits ----

    fn edit_pipeline<R>(
        &mut self,
        channel: usize,
        f: impl FnOnce(&mut Vec<FilterConfig>) -> Result<(R, ListEvent), ModelError>,
    ) -> Result<R, ModelError> {
        let Some(prop) = self.channels.get(channel) else {
            return Err(self.channel_count_error(channel));
        };
        let mut filters = prop.pipeline.filters.clone();
        let (out, change) = f(&mut filters)?;
        self.channels
            .update(channel, |p| p.pipeline.filters = filters);
        self.events
            .emit(&ModelEvent::PipelineChanged { channel, change });
        self.request_render();
        Ok(out)
    }

    fn filter_bounds(channel: usize, index: usize, filters: &[FilterConfig]) -> Result<(), ModelError> {
        if index < filters.len() {
            Ok(())
        } else {
            Err(ModelError::FilterOutOfRange {
                channel,
                index,
                filters: filters.len(),
            })
        }
    }

    /// Append a filter to a channel's pipeline; returns its slot.
    pub fn add_filter(&mut self, channel: usize, kind: FilterKind) -> Result<usize, ModelError> {
        self.edit_pipeline(channel, |filters| {
            filters.push(FilterConfig::new(kind));
            let index = filters.len() - 1;
            Ok((index, ListEvent::ItemAdded(index)))
        })
    }

    pub fn remove_filter(&mut self, channel: usize, index: usize) -> Result<FilterConfig, ModelError> {
        self.edit_pipeline(channel, |filters| {
            Self::filter_bounds(channel, index, filters)?;
            Ok((filters.remove(index), ListEvent::ItemRemoved(index)))
        })
    }

    pub fn move_filter(&mut self, channel: usize, from: usize, to: usize) -> Result<(), ModelError> {
        self.edit_pipeline(channel, |filters| {
            Self::filter_bounds(channel, from, filters)?;
            Self::filter_bounds(channel, to, filters)?;
            let filter = filters.remove(from);
            filters.insert(to, filter);
            Ok(((), ListEvent::Sorted))
        })
    }

    pub fn set_filter_active(
        &mut self,
        channel: usize,
        index: usize,
        active: bool,
    ) -> Result<(), ModelError> {
        self.edit_pipeline(channel, |filters| {
            Self::filter_bounds(channel, index, filters)?;
            filters[index].active = active;
            Ok(((), ListEvent::ItemUpdated(index)))
        })
    }

    pub fn set_filter_param(
        &mut self,
        channel: usize,
        index: usize,
        key: &str,
        value: Value,
    ) -> Result<(), ModelError> {
        self.edit_pipeline(channel, |filters| {
            Self::filter_bounds(channel, index, filters)?;
            filters[index].kind.set_param(key, value)?;
            Ok(((), ListEvent::ItemUpdated(index)))
        })
    }

    pub fn set_pipeline(&mut self, channel: usize, pipeline: PipelineConfig) -> Result<(), ModelError> {
        self.edit_pipeline(channel, |filters| {
            *filters = pipeline.filters;
            Ok(((), ListEvent::Reset))
        })
    }

    // ---- persistence ----

    /// Channel settings in their saved form.
    pub fn save(&self) -> ViewerConfig {
        ViewerConfig {
            channel_props: self.channels.items().to_vec(),
        }
    }

    /// Apply a saved configuration to the current channels.
    ///
    /// Saved channels beyond the current channel count are dropped. Unknown
    /// keys, malformed values and invalid colors are skipped with a warning.
    pub fn load(&mut self, doc: &Value) -> Result<LoadReport, ModelError> {
        let (patches, mut skipped_keys) =
            parse_channel_patches(doc).map_err(|e| ModelError::InvalidConfig(e.to_string()))?;

        let available = self.channels.len();
        let truncated = patches.len().saturating_sub(available);
        if truncated > 0 {
            log::warn!(
                "Configuration describes {} channel(s) but the image has {}; ignoring the rest",
                patches.len(),
                available
            );
        }

        let mut patches: Vec<_> = patches.into_iter().take(available).collect();
        for (i, patch) in patches.iter_mut().enumerate() {
            if let Some(color) = &patch.color {
                if parse_hex(color).is_err() {
                    log::warn!("Ignoring invalid color '{color}' for channel {i}");
                    skipped_keys.push(format!("channel_props.{i}.color"));
                    patch.color = None;
                }
            }
        }
        let applied = patches.len();

        self.batch(|model| {
            for (i, patch) in patches.into_iter().enumerate() {
                model.channels.update(i, |p| patch.apply_to(p));
            }
        });

        Ok(LoadReport {
            applied,
            truncated,
            skipped_keys,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use serde_json::json;

    use crate::media::Plane;
    use crate::render::Renderer;
    use crate::render::backend::Backend;
    use crate::render::response;

    const TIMEOUT: Duration = Duration::from_secs(20);

    fn options() -> ModelOptions {
        ModelOptions {
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        }
    }

    fn image(width: u32, height: u32, channels: u32) -> Arc<Image> {
        let planes: Vec<_> = (0..channels)
            .map(|c| Plane::from_fn(width, height, move |x, y| ((x * (c + 1) + y * 3) % 23) as f32))
            .collect();
        Arc::new(Image::from_planes(&planes).unwrap())
    }

    fn record(model: &Model) -> Rc<RefCell<Vec<ModelEvent>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        model.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        log
    }

    #[test]
    fn update_image_rebuilds_channels() {
        let mut model = Model::new(options());
        let log = record(&model);
        model.update_image(image(8, 8, 3));

        let names: Vec<_> = model.channels().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Channel 0", "Channel 1", "Channel 2"]);
        assert!(log.borrow().contains(&ModelEvent::ChannelsChanged(ListEvent::Reset)));
        assert!(log.borrow().contains(&ModelEvent::PropertyChanged(Property::Image)));
        assert!(model.wait_for_render(TIMEOUT));
        assert!(model.last_render().is_some());
    }

    #[test]
    fn end_to_end_hidden_channel() {
        let mut model = Model::new(options());
        let img = image(64, 64, 3);
        model.update_image(Arc::clone(&img));
        model.set_color(0, "#ff0000").unwrap();
        model.set_color(2, "#0000ff").unwrap();
        model.set_visible(1, false).unwrap();
        assert!(model.wait_for_render(TIMEOUT));

        let frame = model.last_render().expect("frame");
        assert_eq!(frame.composited.dimensions(), (64, 64));
        assert_eq!(frame.response_images.len(), 3);
        assert_eq!(frame.response_images[1], response::placeholder());

        // Same channels rendered from scratch agree with the worker's frame.
        let mut reference = Renderer::new(Backend::Cpu);
        reference.set_image(img);
        let expected = reference.render(model.channels()).unwrap();
        assert_eq!(frame.composited, expected.composited);
        assert!(frame.composited.pixels().all(|p| p[1] == 0));
    }

    #[test]
    fn failed_frame_keeps_previous_render() {
        let mut model = Model::new(options());
        model.update_image(image(8, 8, 2));
        assert!(model.wait_for_render(TIMEOUT));
        let before = model.last_render().expect("frame").composited.clone();

        // One more property than the image has channels: this frame fails.
        let mut too_many = model.channels().to_vec();
        too_many.push(ChannelProperty::new(2));
        assert!(model.render_worker.submit(RenderTask {
            channel_properties: too_many,
            image: None,
        }));
        assert!(model.wait_for_render(TIMEOUT));
        assert_eq!(model.render_worker.pending(), 0);
        assert_eq!(model.last_render().expect("frame").composited, before);
    }

    #[test]
    fn solo_and_show_all() {
        let mut model = Model::new(options());
        model.update_image(image(8, 8, 3));
        assert!(model.wait_for_render(TIMEOUT));
        model.solo(1).unwrap();
        let visible: Vec<_> = model.channels().iter().map(|c| c.visible).collect();
        assert_eq!(visible, vec![false, true, false]);
        assert!(model.wait_for_render(TIMEOUT));
        let frame = model.last_render().expect("frame");
        assert_eq!(frame.response_images[0], response::placeholder());
        assert_eq!(frame.response_images[2], response::placeholder());

        model.show_all();
        assert!(model.channels().iter().all(|c| c.visible));

        assert_eq!(
            model.solo(3),
            Err(ModelError::ChannelOutOfRange {
                index: 3,
                channels: 3
            })
        );
    }

    #[test]
    fn save_load_round_trip() {
        let mut model = Model::new(options());
        model.update_image(image(8, 8, 2));
        model.rename(0, "DAPI").unwrap();
        model.set_color(1, "#00ff00").unwrap();
        model.set_visible(1, false).unwrap();
        model.add_filter(0, FilterKind::default_for("gamma_correction").unwrap()).unwrap();
        model.set_filter_param(0, 2, "gamma", json!(0.5)).unwrap();
        let saved = model.save();

        let mut other = Model::new(options());
        other.update_image(image(8, 8, 2));
        let doc = serde_json::to_value(&saved).unwrap();
        let report = other.load(&doc).unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(report.truncated, 0);
        assert!(report.skipped_keys.is_empty());
        assert_eq!(other.channels(), saved.channel_props.as_slice());
    }

    #[test]
    fn load_truncates_extra_channels_and_skips_unknown_keys() {
        let mut model = Model::new(options());
        model.update_image(image(4, 4, 2));
        let doc = json!({
            "channel_props": [
                {"name": "a", "gain": 2},
                {"name": "b", "color": "not-a-color"},
                {"name": "c"},
                {"name": "d"},
            ]
        });
        let report = model.load(&doc).unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(report.truncated, 2);
        assert!(report.skipped_keys.contains(&"channel_props.0.gain".to_string()));
        assert!(report.skipped_keys.contains(&"channel_props.1.color".to_string()));
        assert_eq!(model.channels()[0].name, "a");
        assert_eq!(model.channels()[1].name, "b");
        assert_eq!(model.channels()[1].color, "#ffffff");
    }

    #[test]
    fn load_rejects_non_config_documents() {
        let mut model = Model::new(options());
        model.update_image(image(4, 4, 1));
        assert!(matches!(
            model.load(&json!("nope")),
            Err(ModelError::InvalidConfig(_))
        ));
    }

    #[test]
    fn filter_edits_emit_pipeline_events() {
        let mut model = Model::new(options());
        model.update_image(image(8, 8, 1));
        let log = record(&model);

        let slot = model
            .add_filter(0, FilterKind::default_for("gaussian_blur").unwrap())
            .unwrap();
        assert_eq!(slot, 2);
        model.move_filter(0, 2, 0).unwrap();
        model.set_filter_active(0, 1, false).unwrap();
        let removed = model.remove_filter(0, 0).unwrap();
        assert_eq!(removed.name(), "gaussian_blur");

        let pipeline_events: Vec<_> = log
            .borrow()
            .iter()
            .filter_map(|e| match e {
                ModelEvent::PipelineChanged { channel: 0, change } => Some(*change),
                _ => None,
            })
            .collect();
        assert_eq!(
            pipeline_events,
            vec![
                ListEvent::ItemAdded(2),
                ListEvent::Sorted,
                ListEvent::ItemUpdated(1),
                ListEvent::ItemRemoved(0),
            ]
        );
        let filters = &model.channels()[0].pipeline.filters;
        assert_eq!(filters.len(), 2);
        assert!(!filters[0].active);
    }

    #[test]
    fn invalid_edits_are_rejected() {
        let mut model = Model::new(options());
        model.update_image(image(4, 4, 1));
        assert_eq!(
            model.set_visible(5, false),
            Err(ModelError::ChannelOutOfRange {
                index: 5,
                channels: 1
            })
        );
        assert!(matches!(
            model.remove_filter(0, 9),
            Err(ModelError::FilterOutOfRange { index: 9, .. })
        ));
        assert!(matches!(
            model.set_filter_param(0, 0, "nonsense", json!(1)),
            Err(ModelError::Filter(_))
        ));
        assert_eq!(
            model.set_color(0, "blue"),
            Err(ModelError::InvalidColor("blue".into()))
        );
    }

    #[test]
    fn autocolor_cycles_palette() {
        let mut model = Model::new(options());
        model.update_image(image(4, 4, 12));
        model.autocolor();
        let colors: Vec<_> = model.channels().iter().map(|c| c.color.as_str()).collect();
        assert_eq!(colors[0], PALETTE[0]);
        assert_eq!(colors[9], PALETTE[9]);
        assert_eq!(colors[10], PALETTE[0]);
        assert_eq!(colors[11], PALETTE[1]);
    }

    #[test]
    fn paste_keeps_identity_fields() {
        let mut model = Model::new(options());
        model.update_image(image(4, 4, 2));
        assert_eq!(model.paste_params(1), Ok(false));

        model.set_filter_param(0, 1, "new_upper", json!(90.0)).unwrap();
        model.rename(0, "source").unwrap();
        model.set_color(0, "#ff0000").unwrap();
        model.copy_params(0).unwrap();
        assert_eq!(model.paste_params(1), Ok(true));

        let (src, dst) = (&model.channels()[0], &model.channels()[1]);
        assert_eq!(dst.pipeline, src.pipeline);
        assert_eq!(dst.name, "Channel 1");
        assert_eq!(dst.color, "#ffffff");
    }

    #[test]
    fn transpose_swaps_render_dimensions() {
        let mut model = Model::new(options());
        assert!(!model.transpose_image());
        model.update_image(image(16, 8, 1));
        assert!(model.transpose_image());
        assert!(model.wait_for_render(TIMEOUT));
        let frame = model.last_render().expect("frame");
        assert_eq!(frame.composited.dimensions(), (8, 16));
    }

    #[test]
    fn failed_open_reports_error() {
        let mut model = Model::new(options());
        let log = record(&model);
        model.open("/nonexistent/scan.png");
        assert_eq!(model.pending_io(), 1);
        assert!(model.wait_for_io(TIMEOUT));
        assert_eq!(model.pending_io(), 0);
        assert!(model.last_io_error().is_some());
        assert!(model.image().is_none());
        assert_eq!(
            *log.borrow(),
            vec![
                ModelEvent::IoTaskStarted { pending: 1 },
                ModelEvent::IoTaskFinished {
                    pending: 0,
                    ok: false
                },
            ]
        );
    }

    #[test]
    fn open_loads_and_renders() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.json");
        let data: Vec<f32> = (0..4 * 4 * 2).map(|v| v as f32).collect();
        std::fs::write(
            &path,
            serde_json::to_string(&json!({"rec": {"shape": [4, 4, 2], "data": data}})).unwrap(),
        )
        .unwrap();

        let mut model = Model::new(options());
        model.open(&path);
        assert!(model.wait_for_io(TIMEOUT));
        assert_eq!(model.filename(), Some(path.as_path()));
        assert_eq!(model.channels().len(), 2);
        assert!(model.wait_for_render(TIMEOUT));
        assert_eq!(
            model.last_render().expect("frame").composited.dimensions(),
            (4, 4)
        );
    }
}
