//! Scalar device controls

use std::fmt;

use serde::{Deserialize, Serialize};

const V4L2_CTRL_CLASS_USER: u32 = 0x0098_0000;
const V4L2_CTRL_CLASS_CAMERA: u32 = 0x009a_0000;

const V4L2_CID_BASE: u32 = V4L2_CTRL_CLASS_USER | 0x900;
const V4L2_CID_CAMERA_CLASS_BASE: u32 = V4L2_CTRL_CLASS_CAMERA | 0x900;

/// Device control identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ControlId(pub u32);

impl ControlId {
    pub const BRIGHTNESS: Self = Self(V4L2_CID_BASE);
    pub const CONTRAST: Self = Self(V4L2_CID_BASE + 1);
    pub const SATURATION: Self = Self(V4L2_CID_BASE + 2);
    pub const HUE: Self = Self(V4L2_CID_BASE + 3);
    pub const AUTO_WHITE_BALANCE: Self = Self(V4L2_CID_BASE + 12);
    pub const AUTOGAIN: Self = Self(V4L2_CID_BASE + 18);
    pub const GAIN: Self = Self(V4L2_CID_BASE + 19);
    pub const WHITE_BALANCE_TEMPERATURE: Self = Self(V4L2_CID_BASE + 26);
    pub const SHARPNESS: Self = Self(V4L2_CID_BASE + 27);
    pub const EXPOSURE_ABSOLUTE: Self = Self(V4L2_CID_CAMERA_CLASS_BASE + 2);
    pub const FOCUS_ABSOLUTE: Self = Self(V4L2_CID_CAMERA_CLASS_BASE + 10);
    pub const FOCUS_AUTO: Self = Self(V4L2_CID_CAMERA_CLASS_BASE + 12);
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl From<u32> for ControlId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Control metadata. The current value is always read from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub name: String,
    pub min: i32,
    pub max: i32,
}

/// On/off controls with a fixed value mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BooleanControl {
    AutoWhiteBalance,
    AutoGain,
    AutoFocus,
}

/// Value table for a [`BooleanControl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleMapping {
    pub id: ControlId,
    pub off: i32,
    pub on: i32,
}

impl BooleanControl {
    pub const fn mapping(self) -> ToggleMapping {
        match self {
            BooleanControl::AutoWhiteBalance => ToggleMapping {
                id: ControlId::AUTO_WHITE_BALANCE,
                off: 0,
                on: 1,
            },
            BooleanControl::AutoGain => ToggleMapping {
                id: ControlId::AUTOGAIN,
                off: 0,
                on: 1,
            },
            BooleanControl::AutoFocus => ToggleMapping {
                id: ControlId::FOCUS_AUTO,
                off: 0,
                on: 1,
            },
        }
    }

    pub const fn id(self) -> ControlId {
        self.mapping().id
    }

    pub const fn value(self, on: bool) -> i32 {
        let mapping = self.mapping();
        if on {
            mapping.on
        } else {
            mapping.off
        }
    }
}
