// crates/hn_runtime/src/comm.rs

//! 分区通信器
//!
//! 所有跨分区的数据流动都通过 [`Communicator`] 的集体操作完成。
//! 每个集体操作都是完整的屏障：参与的分区必须全部到达同一调用，
//! 否则其余分区会一直阻塞，这里不提供超时与取消。
//!
//! # 实现
//!
//! - [`SerialComm`]: 单分区，交换即自发自收
//! - [`ThreadComm`]: 每个分区一个线程，共享邮箱 + 屏障
//!
//! # 使用示例
//!
//! ```
//! use hn_runtime::{Communicator, ThreadComm};
//!
//! let world = ThreadComm::world(3).unwrap();
//! std::thread::scope(|s| {
//!     for comm in &world {
//!         s.spawn(move || {
//!             let total = comm.all_reduce_sum(comm.rank() as f64).unwrap();
//!             assert_eq!(total, 3.0);
//!         });
//!     }
//! });
//! ```

use std::any::Any;
use std::sync::{Arc, Barrier};

use hn_foundation::{HnError, HnResult, KahanSum};
use parking_lot::Mutex;

/// 分区间集体通信接口
pub trait Communicator: Sync {
    /// 本分区编号
    fn rank(&self) -> usize;

    /// 分区总数
    fn size(&self) -> usize;

    /// 个性化全交换
    ///
    /// `outgoing[r]` 发往分区 `r`，返回值的第 `r` 项来自分区 `r`。
    /// 所有分区到达后才返回。
    fn exchange_chunks<T: Send + 'static>(&self, outgoing: Vec<Vec<T>>) -> HnResult<Vec<Vec<T>>>;

    /// 集体错误广播
    ///
    /// 任一分区传入错误时，所有分区都返回错误：出错的分区返回自己的错误，
    /// 其余分区返回 [`HnError::Exchange`]，其中记录首个出错分区。
    fn all_agree(&self, local: HnResult<()>) -> HnResult<()> {
        let message = local.as_ref().err().map(|e| e.to_string());
        let outgoing = (0..self.size()).map(|_| vec![message.clone()]).collect();
        let incoming = self.exchange_chunks(outgoing)?;
        local?;
        for (rank, chunk) in incoming.into_iter().enumerate() {
            if let Some(Some(message)) = chunk.into_iter().next() {
                return Err(HnError::exchange(rank, message));
            }
        }
        Ok(())
    }

    /// 在 [`all_agree`](Self::all_agree) 的基础上携带本地结果
    fn agree<T>(&self, local: HnResult<T>) -> HnResult<T> {
        match local {
            Ok(value) => {
                self.all_agree(Ok(()))?;
                Ok(value)
            }
            Err(err) => match self.all_agree(Err(err)) {
                Err(err) => Err(err),
                Ok(()) => Err(HnError::internal("错误广播未返回错误")),
            },
        }
    }

    /// 全局求和，所有分区得到相同结果
    fn all_reduce_sum(&self, value: f64) -> HnResult<f64> {
        let outgoing = (0..self.size()).map(|_| vec![value]).collect();
        let incoming = self.exchange_chunks(outgoing)?;
        Ok(KahanSum::sum_iter(incoming.into_iter().flatten()))
    }
}

// ============================================================
// 单分区
// ============================================================

/// 单分区通信器
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn exchange_chunks<T: Send + 'static>(&self, outgoing: Vec<Vec<T>>) -> HnResult<Vec<Vec<T>>> {
        HnError::check_size("exchange_chunks", 1, outgoing.len())
            .map_err(|e| HnError::exchange(0, e.to_string()))?;
        Ok(outgoing)
    }
}

// ============================================================
// 线程分区
// ============================================================

type Slot = Option<Box<dyn Any + Send>>;

struct Mailboxes {
    size: usize,
    barrier: Barrier,
    /// `slots[from * size + to]`
    slots: Mutex<Vec<Slot>>,
}

/// 线程分区通信器
///
/// 由 [`ThreadComm::world`] 一次创建全部分区，每个线程持有其中一个。
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Mailboxes>,
}

impl ThreadComm {
    /// 创建 `size` 个互相连通的通信器
    pub fn world(size: usize) -> HnResult<Vec<ThreadComm>> {
        if size == 0 {
            return Err(HnError::invalid_input("分区数必须大于 0"));
        }
        let shared = Arc::new(Mailboxes {
            size,
            barrier: Barrier::new(size),
            slots: Mutex::new((0..size * size).map(|_| None).collect()),
        });
        Ok((0..size)
            .map(|rank| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect())
    }
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.shared.size)
            .finish()
    }
}

impl ThreadComm {
    /// 一轮不带错误广播的全交换，返回收到的块与本地发现的不一致
    fn transfer<T: Send + 'static>(&self, outgoing: Vec<Vec<T>>) -> (Vec<Vec<T>>, Option<String>) {
        let size = self.shared.size;
        let sent = outgoing.len();
        let mut outgoing = outgoing.into_iter();

        // 数量不符时仍然参与本轮，避免其他分区卡在屏障上
        {
            let mut slots = self.shared.slots.lock();
            for to in 0..size {
                let chunk: Vec<T> = outgoing.next().unwrap_or_default();
                slots[self.rank * size + to] = Some(Box::new(chunk));
            }
        }
        self.shared.barrier.wait();

        let mut incoming = Vec::with_capacity(size);
        let mut mismatch = (sent != size).then(|| format!("发送块数 {sent} 与分区数 {size} 不符"));
        {
            let mut slots = self.shared.slots.lock();
            for from in 0..size {
                match slots[from * size + self.rank].take() {
                    Some(boxed) => match boxed.downcast::<Vec<T>>() {
                        Ok(chunk) => incoming.push(*chunk),
                        Err(_) => {
                            mismatch.get_or_insert_with(|| format!("来自分区 {from} 的数据类型不一致"));
                            incoming.push(Vec::new());
                        }
                    },
                    None => {
                        mismatch.get_or_insert_with(|| format!("分区 {from} 未写入数据"));
                        incoming.push(Vec::new());
                    }
                }
            }
        }
        self.shared.barrier.wait();
        (incoming, mismatch)
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn exchange_chunks<T: Send + 'static>(&self, outgoing: Vec<Vec<T>>) -> HnResult<Vec<Vec<T>>> {
        let (incoming, local) = self.transfer(outgoing);

        // 本地发现的不一致也要广播，其他分区才不会在下一轮屏障上等待
        let flags = (0..self.shared.size).map(|_| vec![local.clone()]).collect();
        let (flags, _) = self.transfer(flags);
        if let Some(message) = local {
            return Err(HnError::exchange(self.rank, message));
        }
        for (rank, flag) in flags.into_iter().enumerate() {
            if let Some(Some(message)) = flag.into_iter().next() {
                return Err(HnError::exchange(rank, message));
            }
        }
        Ok(incoming)
    }
}
