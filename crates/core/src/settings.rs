//! Persisted effect settings and their change channel.
//!
//! [`Settings`] is a flat serde struct written to disk as JSON after load and
//! after every change. Other threads schedule changes through a cloneable
//! [`SettingsHandle`]; the render thread applies them with
//! [`SettingsStore::drain_pending`] at the start of each stage callback.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading, storing or changing settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed settings JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown setting: {0}")]
    UnknownKey(String),

    #[error("setting '{key}' expects {expected}, got {got}")]
    TypeMismatch {
        key: SettingKey,
        expected: &'static str,
        got: &'static str,
    },

    #[error("cannot parse '{value}' as a value for '{key}'")]
    InvalidValue { key: SettingKey, value: String },

    /// Host-owned keys are changed on the host and only routed to watchers.
    #[error("setting '{0}' is owned by the host")]
    HostOwned(SettingKey),
}

/// The persisted blob. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ssr_enabled: bool,
    pub ssr_blurred_normal: bool,
    pub ssr_diffraction: bool,
    pub ssr_water_transparency: i32,
    pub ssr_splash_transparency: i32,
    pub ssr_reflection_dimming: i32,
    pub ssr_tint_influence: i32,
    pub ssr_sky_mixin: i32,
    pub volumetric_flatness: i32,
    pub volumetric_intensity: i32,
    pub ssdo_enabled: bool,
    pub overexposure_intensity: i32,
    pub sun_bloom_intensity: i32,
    pub near_shadow_base_width: i32,
    pub near_peter_panning_adjustment: i32,
    pub far_peter_panning_adjustment: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ssr_enabled: true,
            ssr_blurred_normal: false,
            ssr_diffraction: true,
            ssr_water_transparency: 0,
            ssr_splash_transparency: 65,
            ssr_reflection_dimming: 105,
            ssr_tint_influence: 70,
            ssr_sky_mixin: 22,
            volumetric_flatness: 76,
            volumetric_intensity: 33,
            ssdo_enabled: true,
            overexposure_intensity: 31,
            sun_bloom_intensity: 49,
            near_shadow_base_width: 15,
            near_peter_panning_adjustment: 2,
            far_peter_panning_adjustment: 5,
        }
    }
}

impl Settings {
    /// Parses a JSON blob; missing fields default and integers are clamped.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_json::from_str(json)?;
        Ok(settings.clamped())
    }

    pub fn to_json_pretty(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns a copy with every integer clamped to its allowed range.
    pub fn clamped(mut self) -> Self {
        for key in SettingKey::ALL {
            if let (Some(range), SettingValue::Int(v)) = (key.range(), self.get(key)) {
                let clamped = v.clamp(*range.start(), *range.end());
                if clamped != v {
                    log::warn!("{key} = {v} is out of range, clamped to {clamped}");
                    self.write(key, SettingValue::Int(clamped));
                }
            }
        }
        self
    }

    /// Reads a setting. Host-owned keys read as `Int(0)`.
    pub fn get(&self, key: SettingKey) -> SettingValue {
        use SettingKey::*;
        use SettingValue::{Bool, Int};
        match key {
            SsrEnabled => Bool(self.ssr_enabled),
            SsrBlurredNormal => Bool(self.ssr_blurred_normal),
            SsrDiffraction => Bool(self.ssr_diffraction),
            SsrWaterTransparency => Int(self.ssr_water_transparency),
            SsrSplashTransparency => Int(self.ssr_splash_transparency),
            SsrReflectionDimming => Int(self.ssr_reflection_dimming),
            SsrTintInfluence => Int(self.ssr_tint_influence),
            SsrSkyMixin => Int(self.ssr_sky_mixin),
            VolumetricFlatness => Int(self.volumetric_flatness),
            VolumetricIntensity => Int(self.volumetric_intensity),
            SsdoEnabled => Bool(self.ssdo_enabled),
            OverexposureIntensity => Int(self.overexposure_intensity),
            SunBloomIntensity => Int(self.sun_bloom_intensity),
            NearShadowBaseWidth => Int(self.near_shadow_base_width),
            NearPeterPanningAdjustment => Int(self.near_peter_panning_adjustment),
            FarPeterPanningAdjustment => Int(self.far_peter_panning_adjustment),
            ShadowMapQuality | GodRayQuality => Int(0),
        }
    }

    /// Writes a setting, clamping integers. Returns the value actually stored.
    ///
    /// # Errors
    ///
    /// `TypeMismatch` for a value of the wrong kind, `HostOwned` for host keys.
    pub fn set(&mut self, key: SettingKey, value: SettingValue) -> Result<SettingValue, SettingsError> {
        if key.is_host_owned() {
            return Err(SettingsError::HostOwned(key));
        }
        let value = match (key.kind(), value) {
            (SettingKind::Bool, SettingValue::Bool(_)) => value,
            (SettingKind::Int, SettingValue::Int(v)) => match key.range() {
                Some(range) => SettingValue::Int(v.clamp(*range.start(), *range.end())),
                None => value,
            },
            (kind, got) => {
                return Err(SettingsError::TypeMismatch {
                    key,
                    expected: kind.name(),
                    got: got.kind().name(),
                })
            }
        };
        self.write(key, value);
        Ok(value)
    }

    fn write(&mut self, key: SettingKey, value: SettingValue) {
        use SettingKey::*;
        match (key, value) {
            (SsrEnabled, SettingValue::Bool(v)) => self.ssr_enabled = v,
            (SsrBlurredNormal, SettingValue::Bool(v)) => self.ssr_blurred_normal = v,
            (SsrDiffraction, SettingValue::Bool(v)) => self.ssr_diffraction = v,
            (SsdoEnabled, SettingValue::Bool(v)) => self.ssdo_enabled = v,
            (SsrWaterTransparency, SettingValue::Int(v)) => self.ssr_water_transparency = v,
            (SsrSplashTransparency, SettingValue::Int(v)) => self.ssr_splash_transparency = v,
            (SsrReflectionDimming, SettingValue::Int(v)) => self.ssr_reflection_dimming = v,
            (SsrTintInfluence, SettingValue::Int(v)) => self.ssr_tint_influence = v,
            (SsrSkyMixin, SettingValue::Int(v)) => self.ssr_sky_mixin = v,
            (VolumetricFlatness, SettingValue::Int(v)) => self.volumetric_flatness = v,
            (VolumetricIntensity, SettingValue::Int(v)) => self.volumetric_intensity = v,
            (OverexposureIntensity, SettingValue::Int(v)) => self.overexposure_intensity = v,
            (SunBloomIntensity, SettingValue::Int(v)) => self.sun_bloom_intensity = v,
            (NearShadowBaseWidth, SettingValue::Int(v)) => self.near_shadow_base_width = v,
            (NearPeterPanningAdjustment, SettingValue::Int(v)) => {
                self.near_peter_panning_adjustment = v
            }
            (FarPeterPanningAdjustment, SettingValue::Int(v)) => {
                self.far_peter_panning_adjustment = v
            }
            (key, value) => log::error!("ignoring {value:?} for {key}: wrong kind or host-owned"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Bool,
    Int,
}

impl SettingKind {
    pub fn name(self) -> &'static str {
        match self {
            SettingKind::Bool => "bool",
            SettingKind::Int => "int",
        }
    }
}

/// A setting value as scheduled or stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i32),
}

impl SettingValue {
    pub fn kind(self) -> SettingKind {
        match self {
            SettingValue::Bool(_) => SettingKind::Bool,
            SettingValue::Int(_) => SettingKind::Int,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            SettingValue::Bool(v) => Some(v),
            SettingValue::Int(_) => None,
        }
    }

    pub fn as_int(self) -> Option<i32> {
        match self {
            SettingValue::Int(v) => Some(v),
            SettingValue::Bool(_) => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(v) => write!(f, "{v}"),
            SettingValue::Int(v) => write!(f, "{v}"),
        }
    }
}

/// Every setting an effect can watch. The last two live on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingKey {
    SsrEnabled,
    SsrBlurredNormal,
    SsrDiffraction,
    SsrWaterTransparency,
    SsrSplashTransparency,
    SsrReflectionDimming,
    SsrTintInfluence,
    SsrSkyMixin,
    VolumetricFlatness,
    VolumetricIntensity,
    SsdoEnabled,
    OverexposureIntensity,
    SunBloomIntensity,
    NearShadowBaseWidth,
    NearPeterPanningAdjustment,
    FarPeterPanningAdjustment,
    ShadowMapQuality,
    GodRayQuality,
}

impl SettingKey {
    pub const ALL: [SettingKey; 18] = [
        SettingKey::SsrEnabled,
        SettingKey::SsrBlurredNormal,
        SettingKey::SsrDiffraction,
        SettingKey::SsrWaterTransparency,
        SettingKey::SsrSplashTransparency,
        SettingKey::SsrReflectionDimming,
        SettingKey::SsrTintInfluence,
        SettingKey::SsrSkyMixin,
        SettingKey::VolumetricFlatness,
        SettingKey::VolumetricIntensity,
        SettingKey::SsdoEnabled,
        SettingKey::OverexposureIntensity,
        SettingKey::SunBloomIntensity,
        SettingKey::NearShadowBaseWidth,
        SettingKey::NearPeterPanningAdjustment,
        SettingKey::FarPeterPanningAdjustment,
        SettingKey::ShadowMapQuality,
        SettingKey::GodRayQuality,
    ];

    /// JSON field name (host keys use the host's own names).
    pub fn name(self) -> &'static str {
        use SettingKey::*;
        match self {
            SsrEnabled => "ssr_enabled",
            SsrBlurredNormal => "ssr_blurred_normal",
            SsrDiffraction => "ssr_diffraction",
            SsrWaterTransparency => "ssr_water_transparency",
            SsrSplashTransparency => "ssr_splash_transparency",
            SsrReflectionDimming => "ssr_reflection_dimming",
            SsrTintInfluence => "ssr_tint_influence",
            SsrSkyMixin => "ssr_sky_mixin",
            VolumetricFlatness => "volumetric_flatness",
            VolumetricIntensity => "volumetric_intensity",
            SsdoEnabled => "ssdo_enabled",
            OverexposureIntensity => "overexposure_intensity",
            SunBloomIntensity => "sun_bloom_intensity",
            NearShadowBaseWidth => "near_shadow_base_width",
            NearPeterPanningAdjustment => "near_peter_panning_adjustment",
            FarPeterPanningAdjustment => "far_peter_panning_adjustment",
            ShadowMapQuality => "shadowMapQuality",
            GodRayQuality => "godRays",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn kind(self) -> SettingKind {
        use SettingKey::*;
        match self {
            SsrEnabled | SsrBlurredNormal | SsrDiffraction | SsdoEnabled => SettingKind::Bool,
            _ => SettingKind::Int,
        }
    }

    /// Allowed range for integer settings, matching the configuration dialogs.
    pub fn range(self) -> Option<RangeInclusive<i32>> {
        use SettingKey::*;
        match self {
            SsrWaterTransparency | SsrSplashTransparency | SsrTintInfluence | SsrSkyMixin => {
                Some(0..=100)
            }
            SsrReflectionDimming => Some(1..=400),
            VolumetricFlatness => Some(1..=199),
            VolumetricIntensity => Some(1..=100),
            OverexposureIntensity => Some(0..=200),
            SunBloomIntensity => Some(0..=100),
            NearShadowBaseWidth => Some(5..=30),
            NearPeterPanningAdjustment => Some(0..=4),
            FarPeterPanningAdjustment => Some(0..=8),
            _ => None,
        }
    }

    pub fn is_host_owned(self) -> bool {
        matches!(self, SettingKey::ShadowMapQuality | SettingKey::GodRayQuality)
    }

    /// Parses command-line text into a value of this key's kind.
    pub fn parse_value(self, text: &str) -> Result<SettingValue, SettingsError> {
        let invalid = || SettingsError::InvalidValue {
            key: self,
            value: text.to_string(),
        };
        match self.kind() {
            SettingKind::Bool => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "on" | "yes" => Ok(SettingValue::Bool(true)),
                "false" | "0" | "off" | "no" => Ok(SettingValue::Bool(false)),
                _ => Err(invalid()),
            },
            SettingKind::Int => text.trim().parse().map(SettingValue::Int).map_err(|_| invalid()),
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One applied (or host-reported) change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingChange {
    pub key: SettingKey,
    pub value: SettingValue,
}

/// Schedules changes from any thread.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    sender: Sender<SettingChange>,
}

impl SettingsHandle {
    /// Queues a change for the render thread. Returns `false` once the store is gone.
    pub fn schedule(&self, key: SettingKey, value: SettingValue) -> bool {
        self.sender.send(SettingChange { key, value }).is_ok()
    }
}

/// Owns the current settings, their file and the pending-change queue.
#[derive(Debug)]
pub struct SettingsStore {
    settings: Settings,
    path: Option<PathBuf>,
    sender: Sender<SettingChange>,
    receiver: Receiver<SettingChange>,
}

impl SettingsStore {
    /// A store that never touches disk.
    pub fn in_memory(settings: Settings) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            settings: settings.clamped(),
            path: None,
            sender,
            receiver,
        }
    }

    /// Loads `path` (defaults if it does not exist) and writes the clamped,
    /// completed blob back.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let settings = match fs::read_to_string(&path) {
            Ok(json) => Settings::from_json(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no settings at {}, using defaults", path.display());
                Settings::default()
            }
            Err(source) => return Err(SettingsError::Io { path, source }),
        };
        let mut store = Self::in_memory(settings);
        store.path = Some(path);
        store.store()?;
        Ok(store)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn handle(&self) -> SettingsHandle {
        SettingsHandle {
            sender: self.sender.clone(),
        }
    }

    /// Writes the blob to disk; a no-op for in-memory stores.
    pub fn store(&self) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = self.settings.to_json_pretty()?;
        fs::write(path, json).map_err(|source| SettingsError::Io {
            path: path.clone(),
            source,
        })
    }

    /// Applies one change immediately and persists.
    pub fn set(&mut self, key: SettingKey, value: SettingValue) -> Result<SettingChange, SettingsError> {
        let value = self.settings.set(key, value)?;
        self.store()?;
        Ok(SettingChange { key, value })
    }

    /// Restores defaults and persists.
    pub fn reset(&mut self) -> Result<(), SettingsError> {
        self.settings = Settings::default();
        self.store()
    }

    /// Applies every queued change, persists once if anything changed and
    /// returns the changes as stored. Invalid changes are logged and dropped.
    pub fn drain_pending(&mut self) -> Vec<SettingChange> {
        let mut applied = Vec::new();
        while let Ok(change) = self.receiver.try_recv() {
            match self.settings.set(change.key, change.value) {
                Ok(value) => applied.push(SettingChange {
                    key: change.key,
                    value,
                }),
                Err(e) => log::warn!("dropping scheduled change: {e}"),
            }
        }
        if !applied.is_empty() {
            if let Err(e) = self.store() {
                log::error!("failed to persist settings: {e}");
            }
        }
        applied
    }
}

/// Maps setting keys to the watchers interested in them.
#[derive(Debug, Clone)]
pub struct SettingsWatchers<W> {
    watchers: BTreeMap<SettingKey, Vec<W>>,
}

impl<W> Default for SettingsWatchers<W> {
    fn default() -> Self {
        Self {
            watchers: BTreeMap::new(),
        }
    }
}

impl<W: Copy + PartialEq> SettingsWatchers<W> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `watcher` for `key`; registering twice is a no-op.
    pub fn watch(&mut self, key: SettingKey, watcher: W) {
        let list = self.watchers.entry(key).or_default();
        if !list.contains(&watcher) {
            list.push(watcher);
        }
    }

    pub fn watchers(&self, key: SettingKey) -> &[W] {
        self.watchers.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }
}
