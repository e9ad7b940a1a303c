// 该文件是 Qingdian （清点） 项目的一部分。
// src/registry.rs - 类别表与选中状态
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

use std::collections::BTreeSet;

use parking_lot::RwLock;
use tracing::{info, warn};

/// 与输出张量第 4.. 行一一对应的类别名称，以及当前选中的类别集合
///
/// 选中集合只通过显式的选择操作修改，分析开始时取一次快照。
#[derive(Debug)]
pub struct ClassRegistry {
  names: Vec<String>,
  selected: RwLock<BTreeSet<String>>,
}

impl ClassRegistry {
  /// 默认选中全部类别
  pub fn new(names: Vec<String>) -> Self {
    let selected = names.iter().cloned().collect();
    Self {
      names,
      selected: RwLock::new(selected),
    }
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn index_of(&self, name: &str) -> Option<usize> {
    self.names.iter().position(|n| n == name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.index_of(name).is_some()
  }

  /// 选中一个类别；未知类别被忽略并返回 false
  pub fn select(&self, name: &str) -> bool {
    if !self.contains(name) {
      warn!("忽略未知类别: {}", name);
      return false;
    }
    self.selected.write().insert(name.to_string());
    true
  }

  pub fn deselect(&self, name: &str) -> bool {
    self.selected.write().remove(name)
  }

  /// 整体替换选中集合，返回实际生效的类别数；未知类别被忽略
  pub fn set_selection<I, S>(&self, names: I) -> usize
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let selection: BTreeSet<String> = names
      .into_iter()
      .filter_map(|name| {
        let name = name.as_ref();
        if self.contains(name) {
          Some(name.to_string())
        } else {
          warn!("忽略未知类别: {}", name);
          None
        }
      })
      .collect();

    let count = selection.len();
    *self.selected.write() = selection;
    info!("已选择 {} 个类别", count);
    count
  }

  pub fn select_all(&self) {
    *self.selected.write() = self.names.iter().cloned().collect();
  }

  /// 当前选中集合的快照
  pub fn snapshot(&self) -> BTreeSet<String> {
    self.selected.read().clone()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn registry() -> ClassRegistry {
    ClassRegistry::new(
      ["eraser", "pencil", "pen"]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    )
  }

  #[test]
  fn everything_is_selected_initially() {
    let reg = registry();
    assert_eq!(reg.snapshot().len(), 3);
    assert_eq!(reg.index_of("pen"), Some(2));
    assert_eq!(reg.index_of("ruler"), None);
  }

  #[test]
  fn select_and_deselect() {
    let reg = registry();
    assert!(reg.deselect("pencil"));
    assert!(!reg.deselect("pencil"));
    assert!(!reg.snapshot().contains("pencil"));
    assert!(reg.select("pencil"));
    assert!(!reg.select("ruler"));
    assert_eq!(reg.snapshot().len(), 3);
  }

  #[test]
  fn set_selection_drops_unknown_names() {
    let reg = registry();
    assert_eq!(reg.set_selection(["pen", "ruler"]), 1);
    assert_eq!(reg.snapshot(), BTreeSet::from(["pen".to_string()]));
    assert_eq!(reg.set_selection(Vec::<String>::new()), 0);
    assert!(reg.snapshot().is_empty());
    reg.select_all();
    assert_eq!(reg.snapshot().len(), 3);
  }

  #[test]
  fn snapshot_is_detached_from_later_changes() {
    let reg = registry();
    let before = reg.snapshot();
    reg.deselect("eraser");
    assert!(before.contains("eraser"));
    assert!(!reg.snapshot().contains("eraser"));
  }
}
