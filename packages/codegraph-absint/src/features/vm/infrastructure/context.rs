//! Analysis context and the virtual machine
//!
//! Everything one analysis run mutates lives in [`AnalysisContext`]: the
//! provenance graph, the value arena, the frame stack, diagnostics, the
//! local tracker and the late-annotation table. Nothing is global; the
//! context is built at the start of a run and dropped (or turned into a
//! result) at its end.
//!
//! [`VirtualMachine`] owns the context. Its behaviour is split over several
//! `impl` blocks: dispatch, frames, names, calls, attributes, operators,
//! annotations and the per-opcode handlers.

use std::collections::BTreeMap;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::AnalysisConfig;
use crate::errors::{VirtualMachineError, VmResult};
use crate::features::abstract_values::{AbstractValue, Converter, ValueStore};
use crate::features::annotations::{LateAnnotation, LocalTracker};
use crate::features::diagnostics::{Diagnostic, DiagnosticSink, ErrorKind, ErrorLog};
use crate::features::frame_state::{Frame, SimpleFrame};
use crate::features::imports::{Importer, ModuleLoader};
use crate::features::typegraph::{BindingId, CfgNodeId, Program, ValueId, VariableId};
use crate::features::vm::domain::{Narrowing, OpcodeTrace, TraceDraft};
use crate::features::vm::infrastructure::branch_tracker::BranchTracker;
use crate::shared::models::Director;

/// A closure cell read before anything was stored into it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LateCell {
    pub cell: VariableId,
    pub placeholder: VariableId,
}

/// State of one analysis run
pub struct AnalysisContext<'a> {
    pub config: AnalysisConfig,
    pub director: &'a Director,
    pub importer: &'a dyn Importer,
    pub program: Program,
    pub values: ValueStore,
    pub converter: Converter,
    pub errorlog: ErrorLog,
    pub tracker: LocalTracker,
    pub late_annotations: Vec<LateAnnotation>,
    pub loader: ModuleLoader,
    /// Innermost frame last
    pub frames: Vec<Frame>,
    pub traces: Vec<OpcodeTrace>,
    pub opcode_counts: BTreeMap<String, u64>,
    /// Name a loaded variable was read from (match narrowing)
    pub var_names: FxHashMap<VariableId, String>,
    /// Functions entered at least once
    pub called_functions: FxHashSet<ValueId>,
    /// Node the builtins and constants live at
    pub root: CfgNodeId,
    pub(crate) late_cells: Vec<LateCell>,
    /// Text of the type expression being resolved; names missing while it
    /// is set become late placeholders instead of errors
    pub(crate) late_expr: Option<String>,
    /// Implicit calls (`__init__`, operator dunders) do not produce traces
    pub(crate) trace_suppressed: usize,
    pub(crate) current_trace: TraceDraft,
    pub(crate) pending_narrowing: Option<Narrowing>,
    pub(crate) pending_kw_names: Option<Vec<String>>,
    pub(crate) branch_tracker: BranchTracker,
    /// Set while functions nothing called are being analyzed
    pub(crate) analyzing: bool,
}

impl std::fmt::Debug for AnalysisContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisContext")
            .field("config", &self.config)
            .field("frames", &self.frames.len())
            .field("program", &self.program.stats())
            .field("values", &self.values.len())
            .field("diagnostics", &self.errorlog.len())
            .finish()
    }
}

impl<'a> AnalysisContext<'a> {
    pub fn new(config: AnalysisConfig, director: &'a Director, importer: &'a dyn Importer) -> Self {
        let mut program = Program::with_step_limit(config.solver_step_limit);
        let root = program.new_cfg_node("root", None);
        program.set_entrypoint(root);
        let mut values = ValueStore::new();
        let converter = Converter::new(&mut values, &mut program, root);
        let errorlog = ErrorLog::new(config.report_errors);
        Self {
            config,
            director,
            importer,
            program,
            values,
            converter,
            errorlog,
            tracker: LocalTracker::new(),
            late_annotations: Vec::new(),
            loader: ModuleLoader::new(),
            frames: Vec::new(),
            traces: Vec::new(),
            opcode_counts: BTreeMap::new(),
            var_names: FxHashMap::default(),
            called_functions: FxHashSet::default(),
            root,
            late_cells: Vec::new(),
            late_expr: None,
            trace_suppressed: 0,
            current_trace: TraceDraft::default(),
            pending_narrowing: None,
            pending_kw_names: None,
            branch_tracker: BranchTracker::new(),
            analyzing: false,
        }
    }

    /// Forward every queued diagnostic to `sink` as well
    pub fn with_sink(mut self, sink: Box<dyn DiagnosticSink>) -> Self {
        self.errorlog = self.errorlog.with_sink(sink);
        self
    }

    /// Call stack summary, outermost first
    pub fn stack_frames(&self) -> Vec<SimpleFrame> {
        self.frames.iter().map(|f| f.simple(f.current_line)).collect()
    }

    pub fn report(&mut self, kind: ErrorKind, message: impl Into<String>) {
        let diagnostic = Diagnostic::new(self.stack_frames(), kind, message);
        self.errorlog.add(diagnostic, self.director);
    }

    pub fn report_with_details(
        &mut self,
        kind: ErrorKind,
        message: impl Into<String>,
        details: impl Into<String>,
    ) {
        let diagnostic = Diagnostic::new(self.stack_frames(), kind, message).with_details(details);
        self.errorlog.add(diagnostic, self.director);
    }
}

/// The abstract bytecode interpreter
#[derive(Debug)]
pub struct VirtualMachine<'a> {
    pub(crate) ctx: AnalysisContext<'a>,
}

impl<'a> VirtualMachine<'a> {
    pub fn new(ctx: AnalysisContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &AnalysisContext<'a> {
        &self.ctx
    }

    pub fn into_context(self) -> AnalysisContext<'a> {
        self.ctx
    }

    // ═══════════════════════════════════════════════════════════════════
    // Frames
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn frame(&self) -> VmResult<&Frame> {
        self.ctx
            .frames
            .last()
            .ok_or_else(|| VirtualMachineError::NoFrame("frame access".to_string()))
    }

    pub(crate) fn frame_mut(&mut self) -> VmResult<&mut Frame> {
        self.ctx
            .frames
            .last_mut()
            .ok_or_else(|| VirtualMachineError::NoFrame("frame access".to_string()))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Variables
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn new_var(
        &mut self,
        data: &[ValueId],
        sources: &[BindingId],
        node: CfgNodeId,
    ) -> VariableId {
        self.ctx.program.new_variable_with(data, sources, node)
    }

    pub(crate) fn unsolvable(&mut self, node: CfgNodeId) -> VariableId {
        let v = self.ctx.converter.well_known.unsolvable;
        self.new_var(&[v], &[], node)
    }

    pub(crate) fn none_var(&mut self, node: CfgNodeId) -> VariableId {
        let v = self.ctx.converter.well_known.none;
        self.new_var(&[v], &[], node)
    }

    /// Variable holding an instance of `class`
    pub(crate) fn instance_var(&mut self, class: ValueId, node: CfgNodeId) -> VariableId {
        let v = self.ctx.converter.instance_of(&mut self.ctx.values, class);
        self.new_var(&[v], &[], node)
    }

    pub(crate) fn bindings(&self, var: VariableId) -> Vec<BindingId> {
        self.ctx.program.bindings(var).to_vec()
    }

    pub(crate) fn data(&self, var: VariableId) -> Vec<ValueId> {
        self.ctx.program.data(var)
    }

    pub(crate) fn value(&self, id: ValueId) -> &AbstractValue {
        self.ctx.values.get(id)
    }

    /// Replace an overgrown variable by a single unsolvable binding
    pub(crate) fn widen(&mut self, var: VariableId, node: CfgNodeId) -> VariableId {
        if self.ctx.program.variable(var).len() <= self.ctx.config.max_bindings_per_variable {
            return var;
        }
        tracing::debug!(
            var = %var,
            bindings = self.ctx.program.variable(var).len(),
            "Widening variable to unsolvable"
        );
        self.unsolvable(node)
    }

    /// One node standing for all of `nodes`
    pub(crate) fn join_nodes(&mut self, nodes: &[CfgNodeId]) -> CfgNodeId {
        let mut unique: Vec<CfgNodeId> = Vec::with_capacity(nodes.len());
        for n in nodes {
            if !unique.contains(n) {
                unique.push(*n);
            }
        }
        match unique.as_slice() {
            [] => self.ctx.root,
            [single] => *single,
            many => {
                let join = self.ctx.program.new_cfg_node("Join", None);
                for n in many {
                    self.ctx.program.connect_to(*n, join);
                }
                join
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Diagnostics and traces
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn report(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.ctx.report(kind, message);
    }

    /// Attach a symbol and the involved variables to the current trace
    pub(crate) fn trace(&mut self, symbol: Option<String>, data: &[VariableId]) {
        self.ctx.current_trace.symbol = symbol;
        self.ctx.current_trace.data.extend_from_slice(data);
    }

    /// Run `f` without recording opcode traces
    pub(crate) fn untraced<T>(&mut self, f: impl FnOnce(&mut Self) -> VmResult<T>) -> VmResult<T> {
        self.ctx.trace_suppressed += 1;
        let result = f(self);
        self.ctx.trace_suppressed -= 1;
        result
    }
}
