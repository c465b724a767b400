//! Preset actions and the dispatcher that runs them.
//!
//! A preset is an ordered list of single-entry tables. A table value decides
//! what the entry is:
//!
//! ```toml
//! [presets]
//! card = [
//!     { quality = 90 },                                  # property: scalar value
//!     { resize = { width = 800, height = 600 } },        # operation: table value
//!     { flip = { mode = "horizontal" } },
//!     { resizeCanvas = { width = 1024, height = 768 } },
//! ]
//! ```
//!
//! ## Binding
//!
//! Every operation declares its parameters in [`OPERATIONS`]: name, whether a
//! default exists, and whether the parameter is plural. Binding a raw action
//! resolves each declared parameter from the supplied table, falls back to
//! the default, and fails with [`PresetError::MissingParameter`] otherwise.
//! Plural parameters accept a scalar (wrapped into a one-element list) or a
//! list. Unknown operation, property, or parameter names are errors; so is a
//! list given to a singular parameter.
//!
//! Names are matched ignoring case and underscores, so `adaptiveThumb`,
//! `adaptive_thumb` and `start_x`/`startX` are interchangeable.
//!
//! Presets from config are compiled once at load time ([`Preset::compile`]),
//! so configuration mistakes surface before any image is touched. Ad-hoc
//! action lists go through [`dispatch`], which binds and applies one action
//! at a time: a bad action fails before it mutates anything, and the effects
//! of earlier actions stay on the working image.

use crate::imaging::{
    BackendError, Color, Corner, FlipMode, ImageBackend, Quality, TextSpec, parse_format,
};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PresetError {
    #[error("unknown operation \"{0}\"")]
    UnknownOperation(String),
    #[error("unknown property \"{0}\"")]
    UnknownProperty(String),
    #[error("unknown parameter \"{parameter}\" for \"{operation}\"")]
    UnknownParameter { operation: String, parameter: String },
    #[error("missing required parameter \"{parameter}\" for \"{operation}\"")]
    MissingParameter { operation: String, parameter: String },
    #[error("invalid parameter \"{parameter}\" for \"{operation}\": {reason}")]
    InvalidParameter {
        operation: String,
        parameter: String,
        reason: String,
    },
    #[error("malformed action: {0}")]
    MalformedAction(String),
}

/// Failure while running an action list against an engine.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Preset(#[from] PresetError),
    #[error(transparent)]
    Imaging(#[from] BackendError),
}

// =============================================================================
// Raw actions
// =============================================================================

/// One `{ name = value }` entry of a preset, as written in config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Value>",
    into = "BTreeMap<String, Value>"
)]
pub struct RawAction {
    pub name: String,
    pub value: Value,
}

impl RawAction {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

impl RawAction {
    /// Read an action list from JSON, e.g. `[{"resize": {"width": 100}}]`.
    pub fn list_from_json(text: &str) -> Result<Vec<Self>, PresetError> {
        serde_json::from_str(text).map_err(|e| PresetError::MalformedAction(e.to_string()))
    }
}

impl TryFrom<BTreeMap<String, Value>> for RawAction {
    type Error = PresetError;

    fn try_from(map: BTreeMap<String, Value>) -> Result<Self, Self::Error> {
        if map.len() != 1 {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            return Err(PresetError::MalformedAction(format!(
                "each action must have exactly one key, got {keys:?}"
            )));
        }
        let (name, value) = map
            .into_iter()
            .next()
            .ok_or_else(|| PresetError::MalformedAction("empty action".into()))?;
        Ok(Self { name, value })
    }
}

impl From<RawAction> for BTreeMap<String, Value> {
    fn from(action: RawAction) -> Self {
        BTreeMap::from([(action.name, action.value)])
    }
}

// =============================================================================
// Parameter schema
// =============================================================================

/// Declared default of an optional parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fallback {
    Bool(bool),
    Int(i64),
    Str(&'static str),
}

impl Fallback {
    fn to_value(self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(b),
            Self::Int(i) => Value::from(i),
            Self::Str(s) => Value::from(s),
        }
    }
}

/// One declared parameter of an operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: Option<Fallback>,
    pub plural: bool,
}

const fn required(name: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        default: None,
        plural: false,
    }
}

const fn optional(name: &'static str, default: Fallback) -> ParamSpec {
    ParamSpec {
        name,
        default: Some(default),
        plural: false,
    }
}

const fn plural(name: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        default: None,
        plural: true,
    }
}

/// An operation name and its parameter list, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperationSpec {
    pub name: &'static str,
    pub params: &'static [ParamSpec],
}

/// Every operation a preset may invoke.
pub const OPERATIONS: &[OperationSpec] = &[
    OperationSpec {
        name: "resize",
        params: &[
            optional("width", Fallback::Bool(false)),
            optional("height", Fallback::Bool(false)),
            optional("proportional", Fallback::Bool(true)),
        ],
    },
    OperationSpec {
        name: "thumb",
        params: &[
            optional("width", Fallback::Bool(false)),
            optional("height", Fallback::Bool(false)),
            optional("proportional", Fallback::Bool(true)),
        ],
    },
    OperationSpec {
        name: "adaptiveThumb",
        params: &[required("width"), required("height")],
    },
    OperationSpec {
        name: "crop",
        params: &[
            required("width"),
            required("height"),
            optional("startX", Fallback::Bool(false)),
            optional("startY", Fallback::Bool(false)),
        ],
    },
    OperationSpec {
        name: "rotate",
        params: &[
            required("degrees"),
            optional("backgroundColor", Fallback::Str("#000000")),
        ],
    },
    OperationSpec {
        name: "flip",
        params: &[required("mode")],
    },
    OperationSpec {
        name: "resizeCanvas",
        params: &[
            required("width"),
            required("height"),
            optional("backgroundColor", Fallback::Str("#FFFFFF")),
        ],
    },
    OperationSpec {
        name: "watermark",
        params: &[
            required("file"),
            required("offsetX"),
            required("offsetY"),
            optional("corner", Fallback::Str("right-bottom")),
        ],
    },
    OperationSpec {
        name: "text",
        params: &[
            plural("text"),
            required("fontFile"),
            optional("size", Fallback::Int(12)),
            optional("color", Fallback::Str("#000000")),
            optional("corner", Fallback::Str("left-top")),
            optional("offsetX", Fallback::Int(0)),
            optional("offsetY", Fallback::Int(0)),
            optional("angle", Fallback::Int(0)),
        ],
    },
];

/// Case- and underscore-insensitive key used for name matching.
fn normalize(name: &str) -> String {
    name.replace(['_', '-'], "").to_ascii_lowercase()
}

/// Find the schema of an operation by name.
pub fn lookup(name: &str) -> Option<&'static OperationSpec> {
    let wanted = normalize(name);
    OPERATIONS.iter().find(|spec| normalize(spec.name) == wanted)
}

/// Parameters of one operation after defaults and plural coercion.
struct Bound {
    operation: &'static str,
    values: BTreeMap<&'static str, Value>,
}

fn bind(spec: &'static OperationSpec, params: &serde_json::Map<String, Value>) -> Result<Bound, PresetError> {
    let supplied: BTreeMap<String, &Value> =
        params.iter().map(|(k, v)| (normalize(k), v)).collect();

    for key in params.keys() {
        if !spec.params.iter().any(|p| normalize(p.name) == normalize(key)) {
            return Err(PresetError::UnknownParameter {
                operation: spec.name.to_string(),
                parameter: key.clone(),
            });
        }
    }

    let mut values = BTreeMap::new();
    for param in spec.params {
        let value = match supplied.get(&normalize(param.name)) {
            Some(Value::Null) | None => match param.default {
                Some(default) => default.to_value(),
                None => {
                    return Err(PresetError::MissingParameter {
                        operation: spec.name.to_string(),
                        parameter: param.name.to_string(),
                    });
                }
            },
            Some(Value::Array(items)) if param.plural => Value::Array(items.clone()),
            Some(value) if param.plural => Value::Array(vec![(*value).clone()]),
            Some(Value::Array(_)) => {
                return Err(PresetError::InvalidParameter {
                    operation: spec.name.to_string(),
                    parameter: param.name.to_string(),
                    reason: "expected a single value, got a list".to_string(),
                });
            }
            Some(value) => (*value).clone(),
        };
        values.insert(param.name, value);
    }

    Ok(Bound {
        operation: spec.name,
        values,
    })
}

impl Bound {
    fn invalid(&self, parameter: &str, reason: impl Into<String>) -> PresetError {
        PresetError::InvalidParameter {
            operation: self.operation.to_string(),
            parameter: parameter.to_string(),
            reason: reason.into(),
        }
    }

    fn value(&self, name: &str) -> &Value {
        // Every declared parameter is present after `bind`.
        self.values.get(name).unwrap_or(&Value::Null)
    }

    fn number(&self, name: &str) -> Result<f64, PresetError> {
        match self.value(name) {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .filter(|n: &f64| n.is_finite())
        .ok_or_else(|| self.invalid(name, format!("expected a number, got {}", self.value(name))))
    }

    fn int(&self, name: &str) -> Result<i64, PresetError> {
        let n = self.number(name)?;
        if n.fract() != 0.0 {
            return Err(self.invalid(name, format!("expected an integer, got {n}")));
        }
        Ok(n as i64)
    }

    fn pixels(&self, name: &str) -> Result<u32, PresetError> {
        let n = self.int(name)?;
        u32::try_from(n).map_err(|_| self.invalid(name, format!("expected a pixel count, got {n}")))
    }

    /// `false` means "not set"; anything else must be a pixel count.
    fn optional_pixels(&self, name: &str) -> Result<Option<u32>, PresetError> {
        match self.value(name) {
            Value::Bool(false) => Ok(None),
            _ => self.pixels(name).map(Some),
        }
    }

    fn flag(&self, name: &str) -> Result<bool, PresetError> {
        match self.value(name) {
            Value::Bool(b) => Ok(*b),
            Value::Number(n) if n.as_i64() == Some(0) => Ok(false),
            Value::Number(n) if n.as_i64() == Some(1) => Ok(true),
            other => Err(self.invalid(name, format!("expected a boolean, got {other}"))),
        }
    }

    fn text(&self, name: &str) -> Result<String, PresetError> {
        match self.value(name) {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(self.invalid(name, format!("expected a string, got {other}"))),
        }
    }

    fn lines(&self, name: &str) -> Result<Vec<String>, PresetError> {
        match self.value(name) {
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    Value::Number(n) => Ok(n.to_string()),
                    other => Err(self.invalid(name, format!("expected text, got {other}"))),
                })
                .collect(),
            other => Err(self.invalid(name, format!("expected text, got {other}"))),
        }
    }

    fn color(&self, name: &str) -> Result<Color, PresetError> {
        self.text(name)?
            .parse()
            .map_err(|e: BackendError| self.invalid(name, e.to_string()))
    }

    fn corner(&self, name: &str) -> Result<Corner, PresetError> {
        match self.value(name) {
            Value::Number(_) => Corner::from_code(self.int(name)?),
            _ => self.text(name)?.parse(),
        }
        .map_err(|e| self.invalid(name, e.to_string()))
    }

    fn flip_mode(&self, name: &str) -> Result<FlipMode, PresetError> {
        match self.value(name) {
            Value::Number(_) => FlipMode::from_code(self.int(name)?),
            _ => self.text(name)?.parse(),
        }
        .map_err(|e| self.invalid(name, e.to_string()))
    }
}

// =============================================================================
// Typed actions
// =============================================================================

/// A bound operation, ready to run against an engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Resize {
        width: Option<u32>,
        height: Option<u32>,
        proportional: bool,
    },
    Thumb {
        width: Option<u32>,
        height: Option<u32>,
        proportional: bool,
    },
    AdaptiveThumb {
        width: u32,
        height: u32,
    },
    Crop {
        width: u32,
        height: u32,
        start_x: Option<u32>,
        start_y: Option<u32>,
    },
    Rotate {
        degrees: f64,
        background: Color,
    },
    Flip {
        mode: FlipMode,
    },
    ResizeCanvas {
        width: u32,
        height: u32,
        background: Color,
    },
    Watermark {
        file: PathBuf,
        offset_x: i64,
        offset_y: i64,
        corner: Corner,
    },
    Text(TextSpec),
}

impl Operation {
    /// Bind a parameter table to the named operation.
    pub fn bind(name: &str, params: &serde_json::Map<String, Value>) -> Result<Self, PresetError> {
        let spec = lookup(name).ok_or_else(|| PresetError::UnknownOperation(name.to_string()))?;
        let args = bind(spec, params)?;

        let operation = match spec.name {
            "resize" => Self::Resize {
                width: args.optional_pixels("width")?,
                height: args.optional_pixels("height")?,
                proportional: args.flag("proportional")?,
            },
            "thumb" => Self::Thumb {
                width: args.optional_pixels("width")?,
                height: args.optional_pixels("height")?,
                proportional: args.flag("proportional")?,
            },
            "adaptiveThumb" => Self::AdaptiveThumb {
                width: args.pixels("width")?,
                height: args.pixels("height")?,
            },
            "crop" => Self::Crop {
                width: args.pixels("width")?,
                height: args.pixels("height")?,
                start_x: args.optional_pixels("startX")?,
                start_y: args.optional_pixels("startY")?,
            },
            "rotate" => Self::Rotate {
                degrees: args.number("degrees")?,
                background: args.color("backgroundColor")?,
            },
            "flip" => Self::Flip {
                mode: args.flip_mode("mode")?,
            },
            "resizeCanvas" => Self::ResizeCanvas {
                width: args.pixels("width")?,
                height: args.pixels("height")?,
                background: args.color("backgroundColor")?,
            },
            "watermark" => Self::Watermark {
                file: PathBuf::from(args.text("file")?),
                offset_x: args.int("offsetX")?,
                offset_y: args.int("offsetY")?,
                corner: args.corner("corner")?,
            },
            "text" => Self::Text(TextSpec {
                lines: args.lines("text")?,
                font_file: PathBuf::from(args.text("fontFile")?),
                size: args.number("size")? as f32,
                color: args.color("color")?,
                corner: args.corner("corner")?,
                offset_x: args.int("offsetX")?,
                offset_y: args.int("offsetY")?,
                angle: args.number("angle")?,
            }),
            other => return Err(PresetError::UnknownOperation(other.to_string())),
        };
        Ok(operation)
    }

    /// Run the operation on the engine's working image.
    pub fn apply(&self, engine: &mut dyn ImageBackend) -> Result<(), BackendError> {
        match self {
            Self::Resize {
                width,
                height,
                proportional,
            } => engine.resize(*width, *height, *proportional),
            Self::Thumb {
                width,
                height,
                proportional,
            } => engine.thumb(*width, *height, *proportional),
            Self::AdaptiveThumb { width, height } => engine.adaptive_thumb(*width, *height),
            Self::Crop {
                width,
                height,
                start_x,
                start_y,
            } => engine.crop(*width, *height, *start_x, *start_y),
            Self::Rotate {
                degrees,
                background,
            } => engine.rotate(*degrees, *background),
            Self::Flip { mode } => engine.flip(*mode),
            Self::ResizeCanvas {
                width,
                height,
                background,
            } => engine.resize_canvas(*width, *height, *background),
            Self::Watermark {
                file,
                offset_x,
                offset_y,
                corner,
            } => engine.watermark(file, *offset_x, *offset_y, *corner),
            Self::Text(spec) => engine.text(spec),
        }
    }
}

/// Engine state set directly by a scalar action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Property {
    Quality(Quality),
    Format(ImageFormat),
}

impl Property {
    pub fn bind(name: &str, value: &Value) -> Result<Self, PresetError> {
        let invalid = |reason: String| PresetError::InvalidParameter {
            operation: name.to_string(),
            parameter: "value".to_string(),
            reason,
        };
        match normalize(name).as_str() {
            "quality" => value
                .as_u64()
                .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
                .filter(|q| (1..=100).contains(q))
                .map(|q| Self::Quality(Quality::new(q as u32)))
                .ok_or_else(|| invalid(format!("expected 1-100, got {value}"))),
            "format" => value
                .as_str()
                .ok_or_else(|| invalid(format!("expected a format name, got {value}")))
                .and_then(|s| parse_format(s).map_err(|e| invalid(e.to_string())))
                .map(Self::Format),
            _ => Err(PresetError::UnknownProperty(name.to_string())),
        }
    }

    pub fn apply(&self, engine: &mut dyn ImageBackend) {
        match self {
            Self::Quality(quality) => engine.set_quality(quality.value()),
            Self::Format(format) => engine.set_output_format(*format),
        }
    }
}

/// A single preset step: an operation invocation or a property assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Operation(Operation),
    SetProperty(Property),
}

impl Action {
    /// Bind a raw config entry. Tables are operations, scalars are properties.
    pub fn parse(raw: &RawAction) -> Result<Self, PresetError> {
        match &raw.value {
            Value::Object(params) => Operation::bind(&raw.name, params).map(Self::Operation),
            scalar => Property::bind(&raw.name, scalar).map(Self::SetProperty),
        }
    }

    pub fn apply(&self, engine: &mut dyn ImageBackend) -> Result<(), BackendError> {
        match self {
            Self::Operation(operation) => operation.apply(engine),
            Self::SetProperty(property) => {
                property.apply(engine);
                Ok(())
            }
        }
    }
}

/// A named, compiled action list.
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub name: String,
    pub actions: Vec<Action>,
}

impl Preset {
    /// Bind every action up front; the first bad action fails the preset.
    pub fn compile(name: &str, raw: &[RawAction]) -> Result<Self, PresetError> {
        let actions = raw.iter().map(Action::parse).collect::<Result<_, _>>()?;
        Ok(Self {
            name: name.to_string(),
            actions,
        })
    }

    /// Apply the actions in order.
    pub fn apply(&self, engine: &mut dyn ImageBackend) -> Result<(), BackendError> {
        apply_actions(engine, &self.actions)
    }
}

/// Apply already-bound actions in list order.
pub fn apply_actions(engine: &mut dyn ImageBackend, actions: &[Action]) -> Result<(), BackendError> {
    for action in actions {
        action.apply(engine)?;
    }
    Ok(())
}

/// Bind and apply raw actions one at a time, in list order.
///
/// Stops at the first failure. Actions before it have already been applied.
pub fn dispatch(engine: &mut dyn ImageBackend, actions: &[RawAction]) -> Result<(), DispatchError> {
    for raw in actions {
        let action = Action::parse(raw)?;
        action.apply(engine)?;
    }
    Ok(())
}
