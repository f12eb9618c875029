// 该文件是 Shanan （山南西风） 项目的一部分。
// src/slot.rs - 单写单读最新值交接槽
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

//! # 最新值交接槽
//!
//! 容量为 1 的无锁通道：写端放入新值时会先丢弃尚未被读取的旧值，
//! 读端每次取走槽中的值（如果有）。槽中存放的是 `Arc<T>`，
//! 读端拿到的永远是完整构建好的值，不会看到半成品。
//!
//! 写端和读端都不可克隆，保证整个生命周期内只有一个写者、一个读者。

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

pub fn latest_slot<T>() -> (SlotWriter<T>, SlotReader<T>) {
  let (tx, rx) = bounded(1);
  let writer = SlotWriter {
    tx,
    evict: rx.clone(),
  };
  (writer, SlotReader { rx })
}

pub struct SlotWriter<T> {
  tx: Sender<Arc<T>>,
  // 写端持有的接收端，只用来丢弃没人读过的旧值
  evict: Receiver<Arc<T>>,
}

impl<T> SlotWriter<T> {
  /// 放入新值，覆盖尚未被读取的旧值，从不阻塞
  pub fn store(&self, value: Arc<T>) {
    let mut value = value;
    loop {
      match self.tx.try_send(value) {
        Ok(()) => return,
        Err(TrySendError::Full(rejected)) => {
          let _ = self.evict.try_recv();
          value = rejected;
        }
        Err(TrySendError::Disconnected(_)) => return,
      }
    }
  }
}

pub struct SlotReader<T> {
  rx: Receiver<Arc<T>>,
}

impl<T> SlotReader<T> {
  /// 取走槽中的值，没有新值时返回 `None`，从不阻塞
  pub fn take(&self) -> Option<Arc<T>> {
    self.rx.try_recv().ok()
  }
}
