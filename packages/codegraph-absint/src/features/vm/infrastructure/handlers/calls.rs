//! Call opcodes, function creation and `return`

use std::rc::Rc;

use indexmap::IndexMap;

use crate::errors::{VirtualMachineError, VmResult};
use crate::features::abstract_values::{AbstractValue, InterpreterFunction};
use crate::features::frame_state::{FrameState, Why};
use crate::features::typegraph::VariableId;
use crate::features::vm::domain::CallArgs;
use crate::features::vm::infrastructure::context::VirtualMachine;
use crate::shared::models::{CodeObject, Constant, Instruction};

/// `MAKE_FUNCTION` flag bits
const MAKE_DEFAULTS: u32 = 0x01;
const MAKE_KW_DEFAULTS: u32 = 0x02;
const MAKE_ANNOTATIONS: u32 = 0x04;
const MAKE_CLOSURE: u32 = 0x08;

impl VirtualMachine<'_> {
    // ═══════════════════════════════════════════════════════════════════
    // Call sites
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn op_call_function(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let argc = op.require_arg()? as usize;
        let (state, posargs) = state.popn(argc)?;
        let (state, func) = state.pop()?;
        self.call_and_push(state, func, CallArgs::new(posargs))
    }

    /// The names tuple on top says which trailing arguments are keywords
    pub(crate) fn op_call_function_kw(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let argc = op.require_arg()? as usize;
        let (state, names) = state.pop()?;
        let names = self.keyword_names(names);
        let (state, args) = state.popn(argc)?;
        let (state, func) = state.pop()?;
        let args = split_keywords(args, &names);
        self.call_and_push(state, func, args)
    }

    /// `f(*args, **kwargs)`
    pub(crate) fn op_call_function_ex(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let flags = op.arg_or_zero();
        let (state, kwargs) = if flags & 0x01 != 0 {
            let (state, kwargs) = state.pop()?;
            (state, Some(kwargs))
        } else {
            (state, None)
        };
        let (state, posargs) = state.pop()?;
        let (mut state, func) = state.pop()?;
        // 3.11 leaves a NULL under the callable
        if state.depth() > 0 && self.is_null_marker(state.top()?) {
            state = state.pop_and_discard()?;
        }

        let mut args = match self.sequence_elements(posargs) {
            Some(elements) => CallArgs::new(elements),
            None => CallArgs::default().with_starargs(posargs),
        };
        if let Some(kwargs) = kwargs {
            let known = match self.data(kwargs).as_slice() {
                [single] => self.ctx.values.instance(*single).map(|i| i.members.clone()),
                _ => None,
            };
            match known {
                Some(members) if !members.is_empty() => {
                    for (name, var) in members {
                        args = args.with_named(name, var);
                    }
                }
                _ => args = args.with_starstarargs(kwargs),
            }
        }
        self.call_and_push(state, func, args)
    }

    /// `CALL_METHOD` / `CALL`: stack is `[marker, callable, args...]`.
    /// A NULL marker means a plain call; otherwise the marker is the
    /// function and `callable` its receiver.
    pub(crate) fn op_call_method(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let argc = op.require_arg()? as usize;
        let (state, args) = state.popn(argc)?;
        let (state, callable) = state.pop()?;
        let (state, marker) = state.pop()?;
        let names = self.ctx.pending_kw_names.take().unwrap_or_default();
        let args = split_keywords(args, &names);
        if self.is_null_marker(marker) {
            self.call_and_push(state, callable, args)
        } else {
            let args = args.prepend(callable);
            self.call_and_push(state, marker, args)
        }
    }

    /// Keyword names for the next `CALL`
    pub(crate) fn op_kw_names(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let index = op.require_arg()? as usize;
        let names = match self.frame()?.code.consts.get(index) {
            Some(Constant::Tuple(items)) => items
                .iter()
                .filter_map(|c| match c {
                    Constant::Str(s) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
            _ => {
                return Err(VirtualMachineError::invalid_bytecode(format!(
                    "KW_NAMES constant {index} is not a tuple of names"
                )))
            }
        };
        self.ctx.pending_kw_names = Some(names);
        Ok(state)
    }

    fn call_and_push(&mut self, state: FrameState, func: VariableId, args: CallArgs) -> VmResult<FrameState> {
        let (node, result) = self.call_function(state.node, func, &args)?;
        let mut traced = vec![func];
        traced.extend(args.all_vars());
        traced.push(result);
        self.trace(None, &traced);
        Ok(state.change_cfg_node(node).push(result))
    }

    fn is_null_marker(&self, var: VariableId) -> bool {
        let null = self.ctx.converter.well_known.null;
        let data = self.data(var);
        !data.is_empty() && data.iter().all(|v| *v == null)
    }

    fn keyword_names(&self, names: VariableId) -> Vec<String> {
        self.sequence_elements(names)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|e| match self.data(e).as_slice() {
                [single] => self.ctx.values.str_literal(*single).map(str::to_string),
                _ => None,
            })
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Functions
    // ═══════════════════════════════════════════════════════════════════

    /// Build a function from a code object. Pops, top first: the qualified
    /// name (before 3.11), the code, then whatever the flags announce.
    pub(crate) fn op_make_function(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let flags = op.arg_or_zero();
        let (mut state, mut top) = state.pop()?;
        let mut qualname = None;
        if let Some(name) = self.single_str(top) {
            qualname = Some(name);
            (state, top) = state.pop()?;
        }
        let code = self.code_of(top)?;

        let mut closure = Vec::new();
        if flags & MAKE_CLOSURE != 0 {
            let (next, cells) = state.pop()?;
            state = next;
            closure = self.sequence_elements(cells).unwrap_or_default();
        }
        let mut annotations = IndexMap::new();
        if flags & MAKE_ANNOTATIONS != 0 {
            let (next, var) = state.pop()?;
            state = next;
            annotations = self.annotation_members(var);
        }
        let mut kw_defaults = IndexMap::new();
        if flags & MAKE_KW_DEFAULTS != 0 {
            let (next, var) = state.pop()?;
            state = next;
            kw_defaults = self.dict_members(var);
        }
        let mut defaults = Vec::new();
        if flags & MAKE_DEFAULTS != 0 {
            let (next, var) = state.pop()?;
            state = next;
            defaults = self.sequence_elements(var).unwrap_or_default();
        }

        let name = qualname.unwrap_or_else(|| code.name.clone());
        let globals = self.frame()?.f_globals;
        let func = self.ctx.values.add(AbstractValue::Function(InterpreterFunction {
            name: name.clone(),
            code,
            globals,
            defaults,
            kw_defaults,
            closure,
            annotations,
        }));
        let var = self.new_var(&[func], &[], state.node);
        self.trace(Some(name), &[var]);
        Ok(state.push(var))
    }

    fn code_of(&self, var: VariableId) -> VmResult<Rc<CodeObject>> {
        match self.data(var).as_slice() {
            [single] => match self.value(*single) {
                AbstractValue::Code(code) => Ok(code.clone()),
                other => Err(VirtualMachineError::invalid_bytecode(format!(
                    "MAKE_FUNCTION expects a code object, found {}",
                    other.kind_name()
                ))),
            },
            _ => Err(VirtualMachineError::invalid_bytecode(
                "MAKE_FUNCTION expects exactly one code object",
            )),
        }
    }

    fn single_str(&self, var: VariableId) -> Option<String> {
        match self.data(var).as_slice() {
            [single] => self.ctx.values.str_literal(*single).map(str::to_string),
            _ => None,
        }
    }

    fn dict_members(&self, var: VariableId) -> IndexMap<String, VariableId> {
        match self.data(var).as_slice() {
            [single] => self
                .ctx
                .values
                .instance(*single)
                .map(|i| i.members.clone())
                .unwrap_or_default(),
            _ => IndexMap::new(),
        }
    }

    /// Annotations come as a dict (before 3.10) or a flat tuple of
    /// name/value pairs
    fn annotation_members(&self, var: VariableId) -> IndexMap<String, VariableId> {
        if let Some(elements) = self.sequence_elements(var) {
            let mut out = IndexMap::new();
            for pair in elements.chunks(2) {
                if let [name, value] = pair {
                    if let Some(name) = self.single_str(*name) {
                        out.insert(name, *value);
                    }
                }
            }
            return out;
        }
        self.dict_members(var)
    }

    pub(crate) fn op_return_value(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let (state, value) = state.pop()?;
        let return_var = self.frame()?.return_var;
        self.ctx
            .program
            .paste_variable(return_var, value, Some(state.node), &[]);
        self.trace(None, &[value]);
        Ok(state.set_why(Why::Return))
    }
}

/// Trailing arguments named by `names` become keyword arguments
fn split_keywords(mut args: Vec<VariableId>, names: &[String]) -> CallArgs {
    let keep = args.len().saturating_sub(names.len());
    let keywords = args.split_off(keep);
    let mut call = CallArgs::new(args);
    for (name, var) in names.iter().zip(keywords) {
        call = call.with_named(name.clone(), var);
    }
    call
}
