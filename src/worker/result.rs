// 该文件是 Shanan （山南西风） 项目的一部分。
// src/worker/result.rs - 推理结果发布通道
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

use std::sync::Arc;

use crate::{
  model::DetectionSet,
  slot::{SlotReader, SlotWriter, latest_slot},
};

pub fn result_channel() -> (ResultPublisher, ResultReceiver) {
  let (writer, reader) = latest_slot();
  (
    ResultPublisher { writer },
    ResultReceiver {
      reader,
      current: None,
    },
  )
}

/// 推理线程持有的写端
pub struct ResultPublisher {
  writer: SlotWriter<DetectionSet>,
}

impl ResultPublisher {
  pub fn publish(&self, set: DetectionSet) {
    self.writer.store(Arc::new(set));
  }
}

/// 渲染循环持有的读端
pub struct ResultReceiver {
  reader: SlotReader<DetectionSet>,
  current: Option<Arc<DetectionSet>>,
}

impl ResultReceiver {
  /// 取最新发布的结果；没有新结果时返回上一次的结果
  pub fn consume_latest(&mut self) -> Option<Arc<DetectionSet>> {
    if let Some(set) = self.reader.take() {
      self.current = Some(set);
    }
    self.current.clone()
  }
}
