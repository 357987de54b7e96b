use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}, time::Duration};
use thiserror::Error;

use crate::constants::{DEFAULT_FPS, DEFAULT_SCALE, LCD_HEIGHT, LCD_WIDTH, MAX_INSTANCES};
use crate::display::color::{ColorPreset, Palette, Rgb};
use crate::display::traits::InstanceId;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Everything the display router needs to know. Replaced as a whole on any
/// settings change, never patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmuConfig {
    pub enabled: bool,
    /// Instance to show (0-7), or -1 to pick the first active one
    pub selected_instance: i32,
    pub on_color: Rgb,
    pub off_color: Rgb,
    /// 1.0 = native 48x32, 4.0 = 192x128
    pub scale_factor: f32,
    pub target_fps: u32,
    /// Show on a secondary screen when one is attached
    pub prefer_secondary: bool,
    /// Nearest-neighbor (true) or smoothed (false) scaling
    pub use_nearest_neighbor: bool,
    /// Touch zones for the VMU buttons
    pub show_button_overlay: bool,
}

impl Default for VmuConfig {
    fn default() -> Self {
        let palette = ColorPreset::default().palette();
        Self {
            enabled: false,
            selected_instance: -1,
            on_color: palette.on,
            off_color: palette.off,
            scale_factor: DEFAULT_SCALE,
            target_fps: DEFAULT_FPS,
            prefer_secondary: false,
            use_nearest_neighbor: true,
            show_button_overlay: false,
        }
    }
}

impl VmuConfig {
    /// Copy of this config with the palette of a named preset
    pub fn with_preset(mut self, preset: ColorPreset) -> Self {
        let palette = preset.palette();
        self.on_color = palette.on;
        self.off_color = palette.off;
        self
    }

    /// Copy of this config with a different scale factor
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale_factor = scale;
        self
    }

    pub fn palette(&self) -> Palette {
        Palette::new(self.on_color, self.off_color)
    }

    /// Explicitly selected instance, `None` means auto-select
    pub fn selected(&self) -> Option<InstanceId> {
        usize::try_from(self.selected_instance)
            .ok()
            .filter(|id| *id < MAX_INSTANCES)
    }

    pub fn scaled_width(&self) -> u32 {
        (LCD_WIDTH as f32 * self.scale_factor) as u32
    }

    pub fn scaled_height(&self) -> u32 {
        (LCD_HEIGHT as f32 * self.scale_factor) as u32
    }

    /// Delay between two polls of the LCD
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(1000 / self.target_fps.max(1) as u64)
    }
}

/// On-disk layout. All fields are Options so we can layer them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    pub log_level: Option<String>,     // e.g., "info" | "debug"
    pub display: Option<DisplaySection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DisplaySection {
    pub enabled: Option<bool>,
    pub selected_instance: Option<i32>,
    pub preset: Option<ColorPreset>,   // applied before on/off colors
    pub on_color: Option<Rgb>,
    pub off_color: Option<Rgb>,
    pub scale_factor: Option<f32>,
    pub target_fps: Option<u32>,
    pub prefer_secondary: Option<bool>,
    pub use_nearest_neighbor: Option<bool>,
    pub show_button_overlay: Option<bool>,
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = "vmu-screen", about = "VMU LCD on an overlay or a second screen")]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// shorthand for --log-level debug
    #[arg(long, action = ArgAction::SetTrue)]
    pub debug: bool,
    #[arg(long, action = ArgAction::Set)]
    pub enabled: Option<bool>,
    /// VMU slot 0-7, -1 picks the first active
    #[arg(long, allow_hyphen_values = true)]
    pub instance: Option<i32>,
    #[arg(long, value_enum)]
    pub preset: Option<ColorPreset>,
    #[arg(long)]
    pub on_color: Option<Rgb>,
    #[arg(long)]
    pub off_color: Option<Rgb>,
    #[arg(long)]
    pub scale: Option<f32>,
    #[arg(long)]
    pub fps: Option<u32>,
    #[arg(long, action = ArgAction::Set)]
    pub secondary: Option<bool>,
    /// smoothed instead of nearest-neighbor scaling
    #[arg(long, action = ArgAction::SetTrue)]
    pub smooth: bool,
    #[arg(long, action = ArgAction::Set)]
    pub touch: Option<bool>,
    /// number of host frames to run headless before exiting
    #[arg(long, default_value_t = 600)]
    pub frames: u64,
    /// open desktop windows (requires the `emulator` feature)
    #[arg(long, action = ArgAction::SetTrue)]
    pub window: bool,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Fully merged runtime settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub log_level: String,
    pub display: VmuConfig,
    pub frames: u64,
    pub window: bool,
    pub dump_config: bool,
}

impl Settings {
    /// Pretty YAML of the effective config (nice for debugging)
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        let file = FileConfig {
            log_level: Some(self.log_level.clone()),
            display: Some(DisplaySection::from(&self.display)),
        };
        Ok(serde_yaml::to_string(&file)?)
    }
}

impl From<&VmuConfig> for DisplaySection {
    fn from(cfg: &VmuConfig) -> Self {
        Self {
            enabled: Some(cfg.enabled),
            selected_instance: Some(cfg.selected_instance),
            preset: None,
            on_color: Some(cfg.on_color),
            off_color: Some(cfg.off_color),
            scale_factor: Some(cfg.scale_factor),
            target_fps: Some(cfg.target_fps),
            prefer_secondary: Some(cfg.prefer_secondary),
            use_nearest_neighbor: Some(cfg.use_nearest_neighbor),
            show_button_overlay: Some(cfg.show_button_overlay),
        }
    }
}

/// Public entry point: parse CLI, read YAML, merge, validate.
pub fn load() -> Result<Settings, ConfigError> {
    load_from(Cli::parse())
}

pub fn load_from(cli: Cli) -> Result<Settings, ConfigError> {
    // 1) YAML file (explicit path or search)
    let file = if let Some(p) = cli.config.as_ref() {
        if !p.exists() {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
        read_yaml(p)?
    } else if let Some(p) = find_config_file() {
        read_yaml(&p)?
    } else {
        FileConfig::default()
    };

    // 2) defaults overlaid with the file
    let mut display = VmuConfig::default();
    if let Some(section) = file.display.as_ref() {
        merge_display(&mut display, section);
    }
    let mut log_level = file.log_level.unwrap_or_else(|| "info".to_string());

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut display, &mut log_level, &cli);

    // 4) Validate
    validate(&display)?;

    Ok(Settings {
        log_level,
        display,
        frames: cli.frames,
        window: cli.window,
        dump_config: cli.dump_config,
    })
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/vmu-screen/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/vmu-screen/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/vmu-screen.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["vmu-screen.yaml", "config/vmu-screen.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<FileConfig, ConfigError> {
    let s = fs::read_to_string(path)?;
    parse_yaml(&s)
}

pub fn parse_yaml(text: &str) -> Result<FileConfig, ConfigError> {
    Ok(serde_yaml::from_str(text)?)
}

/// Shallow merge `src` into `dst`, Option-by-Option.
pub fn merge_display(dst: &mut VmuConfig, src: &DisplaySection) {
    if let Some(preset) = src.preset {
        *dst = dst.clone().with_preset(preset);
    }
    if let Some(v) = src.enabled              { dst.enabled = v; }
    if let Some(v) = src.selected_instance    { dst.selected_instance = v; }
    if let Some(v) = src.on_color             { dst.on_color = v; }
    if let Some(v) = src.off_color            { dst.off_color = v; }
    if let Some(v) = src.scale_factor         { dst.scale_factor = v; }
    if let Some(v) = src.target_fps           { dst.target_fps = v; }
    if let Some(v) = src.prefer_secondary     { dst.prefer_secondary = v; }
    if let Some(v) = src.use_nearest_neighbor { dst.use_nearest_neighbor = v; }
    if let Some(v) = src.show_button_overlay  { dst.show_button_overlay = v; }
}

fn apply_cli_overrides(display: &mut VmuConfig, log_level: &mut String, cli: &Cli) {
    if let Some(level) = cli.log_level.as_ref() { *log_level = level.clone(); }
    if cli.debug { *log_level = "debug".to_string(); }

    let section = DisplaySection {
        enabled: cli.enabled,
        selected_instance: cli.instance,
        preset: cli.preset,
        on_color: cli.on_color,
        off_color: cli.off_color,
        scale_factor: cli.scale,
        target_fps: cli.fps,
        prefer_secondary: cli.secondary,
        use_nearest_neighbor: cli.smooth.then_some(false),
        show_button_overlay: cli.touch,
    };
    merge_display(display, &section);
}

/// Range checks live here, at the load boundary; the display core trusts its input.
pub fn validate(cfg: &VmuConfig) -> Result<(), ConfigError> {
    if cfg.selected_instance < -1 || cfg.selected_instance >= MAX_INSTANCES as i32 {
        return Err(ConfigError::Validation(format!(
            "selected_instance must be -1..={}, got {}",
            MAX_INSTANCES - 1,
            cfg.selected_instance
        )));
    }
    if cfg.target_fps == 0 {
        return Err(ConfigError::Validation("target_fps must be > 0".into()));
    }
    if cfg.scale_factor.is_nan() || cfg.scale_factor <= 0.0 {
        return Err(ConfigError::Validation("scale_factor must be > 0".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = VmuConfig::default();
        assert!(!cfg.enabled);
        assert_eq!(cfg.selected_instance, -1);
        assert_eq!(cfg.selected(), None);
        assert_eq!(cfg.on_color, Rgb::from_hex(0x00FF00));
        assert_eq!(cfg.off_color, Rgb::from_hex(0x001100));
        assert_eq!(cfg.scaled_width(), 192);
        assert_eq!(cfg.scaled_height(), 128);
        assert_eq!(cfg.update_interval(), Duration::from_millis(33));
        assert!(cfg.use_nearest_neighbor);
    }

    #[test]
    fn test_selected_range() {
        let mut cfg = VmuConfig::default();
        cfg.selected_instance = 7;
        assert_eq!(cfg.selected(), Some(7));
        cfg.selected_instance = 8;
        assert_eq!(cfg.selected(), None);
    }

    #[test]
    fn test_yaml_merge_preset_then_colors() {
        let text = r##"
log_level: debug
display:
  enabled: true
  preset: amber
  off_color: "#000000"
  target_fps: 60
"##;
        let file = parse_yaml(text).unwrap();
        let mut cfg = VmuConfig::default();
        merge_display(&mut cfg, file.display.as_ref().unwrap());

        assert!(cfg.enabled);
        assert_eq!(cfg.on_color, ColorPreset::Amber.palette().on);
        assert_eq!(cfg.off_color, Rgb::BLACK);
        assert_eq!(cfg.target_fps, 60);
        assert_eq!(file.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_yaml_rejects_bad_color() {
        let text = "display:\n  on_color: \"green\"\n";
        assert!(matches!(parse_yaml(text), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_validation() {
        let mut cfg = VmuConfig::default();
        assert!(validate(&cfg).is_ok());

        cfg.selected_instance = 8;
        assert!(validate(&cfg).is_err());

        cfg.selected_instance = -1;
        cfg.target_fps = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "vmu-screen",
            "--config", "/nonexistent/definitely-missing.yaml",
        ])
        .unwrap();
        assert!(matches!(load_from(cli), Err(ConfigError::Validation(_))));

        let mut cfg = VmuConfig::default();
        let mut level = "info".to_string();
        let cli = Cli::try_parse_from([
            "vmu-screen",
            "--debug",
            "--enabled", "true",
            "--instance", "-1",
            "--preset", "blue",
            "--smooth",
            "--secondary", "true",
        ])
        .unwrap();
        apply_cli_overrides(&mut cfg, &mut level, &cli);

        assert_eq!(level, "debug");
        assert!(cfg.enabled);
        assert!(cfg.prefer_secondary);
        assert!(!cfg.use_nearest_neighbor);
        assert_eq!(cfg.on_color, ColorPreset::Blue.palette().on);
    }

    #[test]
    fn test_dump_round_trip() {
        let settings = Settings {
            log_level: "info".into(),
            display: VmuConfig::default().with_preset(ColorPreset::HighContrast),
            frames: 1,
            window: false,
            dump_config: true,
        };
        let yaml = settings.to_yaml().unwrap();
        let file = parse_yaml(&yaml).unwrap();
        let mut cfg = VmuConfig::default();
        merge_display(&mut cfg, file.display.as_ref().unwrap());
        assert_eq!(cfg, settings.display);
    }
}
