// crates/hn_runtime/src/pnet.rs

//! 跨分区交换图
//!
//! 一张交换图由若干条边 `source -> target` 组成，`target` 属于本分区，
//! `source` 可以属于任意分区。图在运行开始时建好后保持不变，每次交换只
//! 流动边上的数值。
//!
//! # 构建流程
//!
//! 1. [`PnetBuilder::add_connect`] 登记本分区目标依赖的源索引
//! 2. 可选 [`PnetBuilder::reverse`] 得到反向图（需要全交换）
//! 3. [`PnetBuilder::setup`] 协商每个分区需要发送哪些本地值，得到 [`ExchangeGraph`]
//!
//! # 交换的类型状态
//!
//! ```text
//! Pnet::publish ──> Published ──exchange──> Received ──drop──> 可再次 publish
//! ```
//!
//! `Received` 借用着 `Pnet`，在它被丢弃之前无法再次 `publish`，
//! 所以缓冲区不会在上一轮结果被读取前被覆盖。
//!
//! # 使用示例
//!
//! ```
//! use std::sync::Arc;
//! use hn_foundation::PartitionView;
//! use hn_runtime::{Pnet, PnetBuilder, SerialComm};
//!
//! let comm = SerialComm;
//! let view = PartitionView::single(3).unwrap();
//! let mut builder = PnetBuilder::new(view);
//! builder.add_connect(2, 0).unwrap();
//! builder.add_connect(2, 1).unwrap();
//! let graph = Arc::new(builder.setup(&comm).unwrap());
//!
//! let mut pnet: Pnet<f64> = Pnet::new(graph);
//! let received = pnet.publish(|local| local as f64 + 1.0).exchange(&comm).unwrap();
//! assert_eq!(received.sum(2), 3.0);
//! assert_eq!(received.in_len(0), 0);
//! ```

use std::sync::Arc;

use hn_foundation::{HnError, HnResult, PartitionView};
use smallvec::SmallVec;

use crate::comm::Communicator;

/// 单个目标的入边列表
pub type EdgeList = SmallVec<[usize; 4]>;

// ============================================================
// 构建器
// ============================================================

/// 交换图构建器
///
/// 可以 `clone` 出一份副本再 `reverse`，得到同一组边的反向图。
#[derive(Debug, Clone)]
pub struct PnetBuilder {
    view: PartitionView,
    /// 每个本地目标依赖的全局源索引，按登记顺序
    connect: Vec<EdgeList>,
    /// 首个登记失败的描述，在下一次集体操作时广播
    pending: Option<String>,
}

impl PnetBuilder {
    /// 创建空图
    pub fn new(view: PartitionView) -> Self {
        Self {
            view,
            connect: vec![EdgeList::new(); view.len()],
            pending: None,
        }
    }

    /// 分区视图
    pub fn view(&self) -> &PartitionView {
        &self.view
    }

    /// 当前边数
    pub fn edge_count(&self) -> usize {
        self.connect.iter().map(|edges| edges.len()).sum()
    }

    /// 登记一条边：本地目标 `target` 依赖全局源 `source`
    ///
    /// 目标不属于本分区或源越界时返回错误，同时记下错误，
    /// 之后的 `reverse` / `setup` 会让所有分区一起失败。
    pub fn add_connect(&mut self, target: usize, source: usize) -> HnResult<()> {
        let result = self.try_connect(target, source);
        if let Err(err) = &result {
            if self.pending.is_none() {
                self.pending = Some(err.to_string());
            }
        }
        result
    }

    fn try_connect(&mut self, target: usize, source: usize) -> HnResult<()> {
        let local = self
            .view
            .global_to_local(target)
            .map_err(|_| HnError::invalid_input(format!("目标索引 {target} 不属于本分区")))?;
        if source >= self.view.global_len() {
            return Err(HnError::invalid_input(format!(
                "源索引 {source} 超出全局范围 0..{}",
                self.view.global_len()
            )));
        }
        self.connect[local].push(source);
        Ok(())
    }

    fn check<C: Communicator>(&self, comm: &C) -> HnResult<()> {
        if let Some(message) = &self.pending {
            return Err(HnError::invalid_input(message.clone()));
        }
        if comm.size() != self.view.ntask() || comm.rank() != self.view.rank() {
            return Err(HnError::invalid_input(format!(
                "通信器 ({}/{}) 与分区视图 ({}/{}) 不一致",
                comm.rank(),
                comm.size(),
                self.view.rank(),
                self.view.ntask()
            )));
        }
        Ok(())
    }

    /// 按源索引的所属分区分组的 `(source, target)` 边
    fn edges_by_owner(&self) -> HnResult<Vec<Vec<(usize, usize)>>> {
        let mut outgoing = vec![Vec::new(); self.view.ntask()];
        for (local, sources) in self.connect.iter().enumerate() {
            let target = self.view.local_to_global(local);
            for &source in sources {
                outgoing[self.view.owner_of(source)?].push((source, target));
            }
        }
        Ok(outgoing)
    }

    /// 反向图：每条 `source -> target` 变为 `target -> source`
    ///
    /// 反向后的入边按 `(目标, 源)` 排序，与分区方式无关。
    pub fn reverse<C: Communicator>(&self, comm: &C) -> HnResult<PnetBuilder> {
        let outgoing = comm.agree(self.check(comm).and_then(|()| self.edges_by_owner()))?;
        let incoming = comm.exchange_chunks(outgoing)?;

        let mut pairs: Vec<(usize, usize)> = incoming.into_iter().flatten().collect();
        pairs.sort_unstable();

        let mut reversed = PnetBuilder::new(self.view);
        let mut local_result = Ok(());
        for (new_target, new_source) in pairs {
            if let Err(err) = reversed.add_connect(new_target, new_source) {
                local_result = Err(err);
                break;
            }
        }
        comm.all_agree(local_result)?;
        Ok(reversed)
    }

    /// 协商收发表，生成交换图
    pub fn setup<C: Communicator>(self, comm: &C) -> HnResult<ExchangeGraph> {
        let requests = comm.agree(self.check(comm).and_then(|()| self.requests()))?;
        let asked = comm.exchange_chunks(requests.clone())?;

        // 其他分区向本分区索要的值，换成本地索引
        let send_lists: HnResult<Vec<Vec<usize>>> = asked
            .into_iter()
            .map(|globals| {
                globals
                    .into_iter()
                    .map(|g| self.view.global_to_local(g))
                    .collect()
            })
            .collect();
        let send_lists = comm.agree(send_lists)?;

        let recv_counts: Vec<usize> = requests.iter().map(Vec::len).collect();
        let mut recv_disp = Vec::with_capacity(recv_counts.len());
        let mut total = 0;
        for &count in &recv_counts {
            recv_disp.push(total);
            total += count;
        }

        let mut positions = Vec::with_capacity(self.connect.len());
        for sources in &self.connect {
            let mut edge_positions = EdgeList::new();
            for &source in sources {
                let owner = self.view.owner_of(source)?;
                let slot = requests[owner]
                    .binary_search(&source)
                    .map_err(|_| HnError::internal(format!("源索引 {source} 未出现在请求表中")))?;
                edge_positions.push(recv_disp[owner] + slot);
            }
            positions.push(edge_positions);
        }

        tracing::debug!(
            rank = self.view.rank(),
            edges = self.edge_count(),
            recv = total,
            send = send_lists.iter().map(Vec::len).sum::<usize>(),
            "交换图建立完成"
        );

        Ok(ExchangeGraph {
            view: self.view,
            sources: self.connect,
            positions,
            send_lists,
            recv_counts,
            recv_disp,
            recv_total: total,
        })
    }

    /// 每个分区需要提供的源索引（去重、升序）
    fn requests(&self) -> HnResult<Vec<Vec<usize>>> {
        let mut requests = vec![Vec::new(); self.view.ntask()];
        for sources in &self.connect {
            for &source in sources {
                requests[self.view.owner_of(source)?].push(source);
            }
        }
        for list in &mut requests {
            list.sort_unstable();
            list.dedup();
        }
        Ok(requests)
    }
}

// ============================================================
// 交换图
// ============================================================

/// 建好的交换图（只读，可在多个 `Pnet` 间共享）
#[derive(Debug)]
pub struct ExchangeGraph {
    view: PartitionView,
    sources: Vec<EdgeList>,
    positions: Vec<EdgeList>,
    send_lists: Vec<Vec<usize>>,
    recv_counts: Vec<usize>,
    recv_disp: Vec<usize>,
    recv_total: usize,
}

impl ExchangeGraph {
    /// 分区视图
    pub fn view(&self) -> &PartitionView {
        &self.view
    }

    /// 本地目标的入边数
    #[inline]
    pub fn in_len(&self, local_target: usize) -> usize {
        self.sources[local_target].len()
    }

    /// 本地目标的源索引（全局编号），顺序与 [`Received::inputs`] 一致
    #[inline]
    pub fn sources(&self, local_target: usize) -> &[usize] {
        &self.sources[local_target]
    }

    /// 每轮发送的值个数
    pub fn out_len(&self) -> usize {
        self.send_lists.iter().map(Vec::len).sum()
    }

    /// 每轮发送的值对应的全局索引
    pub fn out_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.send_lists
            .iter()
            .flatten()
            .map(|&local| self.view.local_to_global(local))
    }

    /// 全部入边数
    pub fn edge_count(&self) -> usize {
        self.sources.iter().map(|edges| edges.len()).sum()
    }
}

// ============================================================
// 交换缓冲区
// ============================================================

/// 绑定在一张交换图上的收发缓冲区
#[derive(Debug)]
pub struct Pnet<T> {
    graph: Arc<ExchangeGraph>,
    input: Vec<T>,
}

impl<T: Copy + Default + Send + 'static> Pnet<T> {
    /// 为交换图分配缓冲区
    pub fn new(graph: Arc<ExchangeGraph>) -> Self {
        let input = vec![T::default(); graph.recv_total];
        Self { graph, input }
    }

    /// 交换图
    pub fn graph(&self) -> &ExchangeGraph {
        &self.graph
    }

    /// 发布本分区各源索引的值
    ///
    /// `value_of` 以本地索引调用，只对有下游依赖的源调用。
    pub fn publish<F>(&mut self, mut value_of: F) -> Published<'_, T>
    where
        F: FnMut(usize) -> T,
    {
        let chunks = self
            .graph
            .send_lists
            .iter()
            .map(|list| list.iter().map(|&local| value_of(local)).collect())
            .collect();
        Published { pnet: self, chunks }
    }
}

/// 已发布、尚未交换的一轮数据
#[must_use = "发布的数据必须经过 exchange 才能读取"]
pub struct Published<'a, T> {
    pnet: &'a mut Pnet<T>,
    chunks: Vec<Vec<T>>,
}

impl<'a, T: Copy + Send + 'static> Published<'a, T> {
    /// 集体交换，所有分区到达后返回
    pub fn exchange<C: Communicator>(self, comm: &C) -> HnResult<Received<'a, T>> {
        let Published { pnet, chunks } = self;
        let incoming = comm.exchange_chunks(chunks)?;
        let mut outcome = Ok(());
        for (rank, chunk) in incoming.into_iter().enumerate() {
            let expected = pnet.graph.recv_counts[rank];
            if chunk.len() != expected {
                outcome = Err(HnError::exchange(
                    comm.rank(),
                    format!("来自分区 {rank} 的值个数 {} 与期望 {expected} 不符", chunk.len()),
                ));
                break;
            }
            let start = pnet.graph.recv_disp[rank];
            pnet.input[start..start + expected].copy_from_slice(&chunk);
        }
        comm.all_agree(outcome)?;
        Ok(Received { pnet })
    }
}

/// 一轮交换的结果
pub struct Received<'a, T> {
    pnet: &'a Pnet<T>,
}

impl<'a, T: Copy> Received<'a, T> {
    /// 本地目标的入边数
    #[inline]
    pub fn in_len(&self, local_target: usize) -> usize {
        self.pnet.graph.in_len(local_target)
    }

    /// 本地目标收到的各入边值，顺序与 [`ExchangeGraph::sources`] 一致
    pub fn inputs(&self, local_target: usize) -> impl Iterator<Item = T> + '_ {
        self.pnet.graph.positions[local_target]
            .iter()
            .map(move |&position| self.pnet.input[position])
    }

    /// 按自定义方式合并某个目标的入边值
    pub fn gather<R, F>(&self, local_target: usize, combine: F) -> R
    where
        F: FnOnce(&mut dyn Iterator<Item = T>) -> R,
    {
        let mut values = self.inputs(local_target);
        combine(&mut values)
    }
}

impl<'a> Received<'a, f64> {
    /// 入边值之和
    pub fn sum(&self, local_target: usize) -> f64 {
        self.inputs(local_target).sum()
    }

    /// 入边值按权重求和，`weights` 与入边一一对应
    pub fn weighted_sum(&self, local_target: usize, weights: &[f64]) -> f64 {
        debug_assert_eq!(weights.len(), self.in_len(local_target));
        self.inputs(local_target)
            .zip(weights)
            .map(|(value, weight)| value * weight)
            .sum()
    }
}
