//! Test data builders
//!
//! `ModuleBuilder` is a fluent layer over [`Assembler`] for the statement
//! shapes the integration tests need; anything else goes through `raw`.

use codegraph_absint::{
    run_program, AnalysisConfig, AnalysisResult, Assembler, CodeObject, Constant, Director,
    Importer, NullImporter,
};

/// Builder for a `__main__` module body
pub struct ModuleBuilder {
    asm: Assembler,
    director: Director,
    config: AnalysisConfig,
}

impl Default for ModuleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        let mut asm = Assembler::module();
        asm.line(1);
        Self {
            asm,
            director: Director::new(),
            config: AnalysisConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_director(mut self, director: Director) -> Self {
        self.director = director;
        self
    }

    /// Set the line of the following instructions
    pub fn line(mut self, line: u32) -> Self {
        self.asm.line(line);
        self
    }

    /// `name = constant`
    pub fn assign(mut self, name: &str, constant: Constant) -> Self {
        self.asm.load_const(constant).op_name("STORE_NAME", name);
        self
    }

    /// `def name(...): ...` from a finished code object
    pub fn function(mut self, name: &str, code: CodeObject) -> Self {
        self.asm
            .load_code(code)
            .load_const(Constant::Str(name.into()))
            .op_arg("MAKE_FUNCTION", 0)
            .op_name("STORE_NAME", name);
        self
    }

    /// `class name: pass`
    pub fn class(mut self, name: &str) -> Self {
        let mut body = Assembler::new(name);
        body.op_name("LOAD_NAME", "__name__")
            .op_name("STORE_NAME", "__module__")
            .load_const(Constant::None)
            .op("RETURN_VALUE");
        self.asm
            .op("LOAD_BUILD_CLASS")
            .load_code(body.finish().expect("class body assembles"))
            .load_const(Constant::Str(name.into()))
            .op_arg("MAKE_FUNCTION", 0)
            .load_const(Constant::Str(name.into()))
            .op_arg("CALL_FUNCTION", 2)
            .op_name("STORE_NAME", name);
        self
    }

    /// `target = callee(*args)` with every argument a constant
    pub fn call(mut self, target: &str, callee: &str, args: Vec<Constant>) -> Self {
        let argc = args.len() as u32;
        self.asm.op_name("LOAD_NAME", callee);
        for arg in args {
            self.asm.load_const(arg);
        }
        self.asm
            .op_arg("CALL_FUNCTION", argc)
            .op_name("STORE_NAME", target);
        self
    }

    /// `target = callee()` where `callee` is a name (typically a class)
    pub fn instantiate(self, target: &str, callee: &str) -> Self {
        self.call(target, callee, Vec::new())
    }

    /// `if cond: then_name = then_value else: else_name = else_value`
    pub fn if_else(
        mut self,
        cond: &str,
        then_branch: (&str, Constant),
        else_branch: (&str, Constant),
    ) -> Self {
        let (otherwise, end) = (self.asm.label(), self.asm.label());
        self.asm
            .op_name("LOAD_NAME", cond)
            .jump("POP_JUMP_IF_FALSE", otherwise)
            .load_const(then_branch.1)
            .op_name("STORE_NAME", then_branch.0)
            .jump("JUMP_FORWARD", end)
            .place(otherwise)
            .load_const(else_branch.1)
            .op_name("STORE_NAME", else_branch.0)
            .place(end);
        self
    }

    /// Arbitrary instructions
    pub fn raw(mut self, f: impl FnOnce(&mut Assembler)) -> Self {
        f(&mut self.asm);
        self
    }

    /// Close the module with `return None`
    pub fn finish(mut self) -> (CodeObject, Director, AnalysisConfig) {
        self.asm.load_const(Constant::None).op("RETURN_VALUE");
        let code = self.asm.finish().expect("module assembles");
        (code, self.director, self.config)
    }

    /// Finish and analyze with no importable modules
    pub fn analyze(self) -> AnalysisResult {
        self.analyze_with(&NullImporter)
    }

    pub fn analyze_with(self, importer: &dyn Importer) -> AnalysisResult {
        let (code, director, config) = self.finish();
        run_program(code, &director, importer, config).expect("analysis succeeds")
    }
}
