// 该文件是 Cheliang （车辆检测） 项目的一部分。
// src/label.rs - 车辆类别标签
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 车辆类别数量
pub const VEHICLE_CLASS_NUM: usize = 6;

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn to_label_id(&self) -> u32;
  fn from_label_id(id: u32) -> Option<Self>;
}

/// 模型输出的车辆类别，顺序与模型类别编号一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VehicleLabel {
  Bus,
  Car,
  Motorcycle,
  #[serde(rename = "Pickup-truck")]
  PickupTruck,
  #[serde(rename = "Semi-trailer")]
  SemiTrailer,
  Van,
}

impl VehicleLabel {
  pub const ALL: [VehicleLabel; VEHICLE_CLASS_NUM] = [
    VehicleLabel::Bus,
    VehicleLabel::Car,
    VehicleLabel::Motorcycle,
    VehicleLabel::PickupTruck,
    VehicleLabel::SemiTrailer,
    VehicleLabel::Van,
  ];

  pub const fn name(self) -> &'static str {
    match self {
      VehicleLabel::Bus => "Bus",
      VehicleLabel::Car => "Car",
      VehicleLabel::Motorcycle => "Motorcycle",
      VehicleLabel::PickupTruck => "Pickup-truck",
      VehicleLabel::SemiTrailer => "Semi-trailer",
      VehicleLabel::Van => "Van",
    }
  }
}

impl WithLabel for VehicleLabel {
  fn to_label_str(&self) -> String {
    self.name().to_string()
  }

  fn to_label_id(&self) -> u32 {
    *self as u32
  }

  fn from_label_id(id: u32) -> Option<Self> {
    Self::ALL.get(id as usize).copied()
  }
}

impl fmt::Display for VehicleLabel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("未知的车辆类别: {0}")]
pub struct LabelParseError(pub String);

impl FromStr for VehicleLabel {
  type Err = LabelParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let needle = s.trim();
    Self::ALL
      .into_iter()
      .find(|label| label.name().eq_ignore_ascii_case(needle))
      .ok_or_else(|| LabelParseError(s.to_string()))
  }
}

/// 类别编号对应的显示名称，超出类别集合时返回 `Class {id}`
pub fn label_name(id: u32) -> String {
  VehicleLabel::from_label_id(id)
    .map(|label| label.to_label_str())
    .unwrap_or_else(|| format!("Class {}", id))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ids_follow_model_class_order() {
    for (id, label) in VehicleLabel::ALL.iter().enumerate() {
      assert_eq!(label.to_label_id(), id as u32);
      assert_eq!(VehicleLabel::from_label_id(id as u32), Some(*label));
    }
    assert_eq!(VehicleLabel::from_label_id(6), None);
  }

  #[test]
  fn display_names_match_dataset() {
    let names: Vec<_> = VehicleLabel::ALL.iter().map(|l| l.name()).collect();
    assert_eq!(
      names,
      ["Bus", "Car", "Motorcycle", "Pickup-truck", "Semi-trailer", "Van"]
    );
  }

  #[test]
  fn unknown_id_falls_back_to_class_number() {
    assert_eq!(label_name(3), "Pickup-truck");
    assert_eq!(label_name(42), "Class 42");
  }

  #[test]
  fn parse_is_case_insensitive() {
    assert_eq!("semi-trailer".parse(), Ok(VehicleLabel::SemiTrailer));
    assert_eq!(" VAN ".parse(), Ok(VehicleLabel::Van));
    assert!("truck".parse::<VehicleLabel>().is_err());
  }

  #[test]
  fn serializes_as_display_name() {
    let json = serde_json::to_string(&VehicleLabel::PickupTruck).unwrap();
    assert_eq!(json, "\"Pickup-truck\"");
  }
}
