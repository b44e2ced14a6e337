//! Analysis use case
//!
//! Runs one module code object to completion, calls whatever the module
//! body left uncalled, reports unresolved forward references and hands the
//! whole run back as an [`AnalysisResult`].

use std::collections::BTreeMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::info;

use crate::config::{AnalysisConfig, Validatable};
use crate::errors::Result;
use crate::features::abstract_values::{AbstractValue, Namespace, Type, TypeRenderer, ValueStore};
use crate::features::annotations::{Local, LocalOp};
use crate::features::diagnostics::{Diagnostic, DiagnosticSink};
use crate::features::imports::Importer;
use crate::features::typegraph::{CfgNodeId, Program, ValueId, VariableId};
use crate::features::vm::domain::OpcodeTrace;
use crate::features::vm::infrastructure::frames::FrameSetup;
use crate::features::vm::infrastructure::{AnalysisContext, FrameOutcome, VirtualMachine};
use crate::shared::models::{CodeObject, Director};

/// Everything one run produced
#[derive(Debug)]
pub struct AnalysisResult {
    pub program: Program,
    pub values: ValueStore,
    /// Module-level names in definition order
    pub globals: IndexMap<String, VariableId>,
    pub diagnostics: Vec<Diagnostic>,
    pub traces: Vec<OpcodeTrace>,
    pub local_ops: IndexMap<String, Vec<LocalOp>>,
    pub annotated_locals: IndexMap<String, IndexMap<String, Local>>,
    pub opcode_counts: BTreeMap<String, u64>,
    /// Where the module body (and the calls made afterwards) ended
    pub return_node: CfgNodeId,
}

impl AnalysisResult {
    /// Type of a module-level name as seen at the end of the run
    pub fn global_type(&self, name: &str) -> Option<Type> {
        let var = *self.globals.get(name)?;
        Some(self.variable_type(var, self.return_node))
    }

    /// Union of the values of `var` visible at `node`
    pub fn variable_type(&self, var: VariableId, node: CfgNodeId) -> Type {
        let data = self.program.filtered_data(var, node);
        TypeRenderer::new(&self.values, &self.program).union_of(&data)
    }

    /// Values of a module-level name visible at the end of the run
    pub fn global_data(&self, name: &str) -> Vec<ValueId> {
        self.globals
            .get(name)
            .map(|var| self.program.filtered_data(*var, self.return_node))
            .unwrap_or_default()
    }
}

/// Analyze module code objects under one configuration
pub struct ProgramAnalyzer<'a> {
    config: AnalysisConfig,
    director: &'a Director,
    importer: &'a dyn Importer,
    sink: Option<Box<dyn DiagnosticSink>>,
}

impl<'a> ProgramAnalyzer<'a> {
    pub fn new(config: AnalysisConfig, director: &'a Director, importer: &'a dyn Importer) -> Self {
        Self {
            config,
            director,
            importer,
            sink: None,
        }
    }

    /// Forward diagnostics to `sink` as they are queued
    pub fn with_sink(mut self, sink: Box<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn run(self, code: CodeObject) -> Result<AnalysisResult> {
        self.config.validate()?;
        code.validate()?;

        let mut ctx = AnalysisContext::new(self.config, self.director, self.importer);
        if let Some(sink) = self.sink {
            ctx = ctx.with_sink(sink);
        }
        let mut vm = VirtualMachine::new(ctx);
        let globals = vm.new_module("__main__");

        let root = vm.ctx.root;
        let setup = FrameSetup::new(Rc::new(code), globals).locals(globals);
        let exit = match vm.make_frame(root, setup) {
            FrameOutcome::Ready(frame) => vm.run_frame(*frame, root)?.0,
            FrameOutcome::Recursion | FrameOutcome::MaxDepth => root,
        };
        let exit = vm.analyze_uncalled(globals, exit)?;
        vm.flush_late_annotations();

        let ctx = vm.into_context();
        let stats = ctx.program.stats();
        info!(
            nodes = stats.nodes,
            variables = stats.variables,
            bindings = stats.bindings,
            solver_queries = stats.solver_queries,
            diagnostics = ctx.errorlog.len(),
            "Analysis finished"
        );

        let members = ctx
            .values
            .members(globals)
            .map(|m| m.iter().map(|(name, var)| (name.clone(), *var)).collect())
            .unwrap_or_default();
        let (local_ops, annotated_locals) = ctx.tracker.into_parts();
        Ok(AnalysisResult {
            program: ctx.program,
            values: ctx.values,
            globals: members,
            diagnostics: ctx.errorlog.into_diagnostics(),
            traces: ctx.traces,
            local_ops,
            annotated_locals,
            opcode_counts: ctx.opcode_counts,
            return_node: exit,
        })
    }
}

/// Analyze `code` as the `__main__` module
pub fn run_program(
    code: CodeObject,
    director: &Director,
    importer: &dyn Importer,
    config: AnalysisConfig,
) -> Result<AnalysisResult> {
    ProgramAnalyzer::new(config, director, importer).run(code)
}

impl VirtualMachine<'_> {
    /// Fresh module namespace with `__name__` bound at the root
    fn new_module(&mut self, name: &str) -> ValueId {
        let module = self
            .ctx
            .values
            .add(AbstractValue::Module(Namespace::new(name)));
        let value = self.ctx.converter.str_constant(&mut self.ctx.values, name);
        let root = self.ctx.root;
        let var = self.new_var(&[value], &[], root);
        self.ctx.values.set_member(module, "__name__", var);
        module
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::diagnostics::ErrorKind;
    use crate::features::imports::NullImporter;
    use crate::shared::models::{Assembler, Constant};

    fn analyze(asm: Assembler) -> AnalysisResult {
        let director = Director::new();
        run_program(
            asm.finish().unwrap(),
            &director,
            &NullImporter,
            AnalysisConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_globals_keep_definition_order() {
        let mut asm = Assembler::module();
        asm.load_const(Constant::Int(1))
            .op_name("STORE_NAME", "b")
            .load_const(Constant::Str("s".into()))
            .op_name("STORE_NAME", "a")
            .load_const(Constant::None)
            .op("RETURN_VALUE");
        let result = analyze(asm);
        let names: Vec<&str> = result.globals.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["__name__", "b", "a"]);
        assert_eq!(result.global_type("b").unwrap().to_string(), "int");
        assert_eq!(result.global_type("a").unwrap().to_string(), "str");
        assert!(result.global_type("missing").is_none());
    }

    #[test]
    fn test_unknown_opcode_is_fatal() {
        let mut asm = Assembler::module();
        asm.load_const(Constant::None).op("RETURN_VALUE");
        let mut code = asm.finish().unwrap();
        code.blocks[0].instructions[0].mnemonic = "NOT_AN_OPCODE".into();
        let director = Director::new();
        let err = run_program(
            code,
            &director,
            &NullImporter,
            AnalysisConfig::default(),
        )
        .unwrap_err();
        assert!(err.is_fatal_vm_error());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let director = Director::new();
        let code = Assembler::module().finish().unwrap();
        let config = AnalysisConfig::default().max_call_depth(0);
        let err = run_program(code, &director, &NullImporter, config).unwrap_err();
        assert!(matches!(err, crate::errors::AbsintError::Config(_)));
    }

    #[test]
    fn test_undefined_name_reported_with_counts() {
        let mut asm = Assembler::module();
        asm.op_name("LOAD_NAME", "nothing_here")
            .op("POP_TOP")
            .load_const(Constant::None)
            .op("RETURN_VALUE");
        let result = analyze(asm);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].kind, ErrorKind::NameError);
        assert_eq!(result.opcode_counts.get("LOAD_NAME"), Some(&1));
        assert_eq!(result.traces.len(), 4);
    }
}
