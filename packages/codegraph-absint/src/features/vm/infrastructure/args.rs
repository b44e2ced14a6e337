//! Binding call arguments to parameters

use indexmap::IndexMap;
use tracing::debug;

use crate::features::abstract_values::InterpreterFunction;
use crate::features::diagnostics::ErrorKind;
use crate::features::typegraph::{CfgNodeId, VariableId};
use crate::features::vm::domain::CallArgs;
use crate::features::vm::infrastructure::context::VirtualMachine;

impl VirtualMachine<'_> {
    /// Map `args` onto the parameters of `func`.
    ///
    /// Returns `None` after reporting when the call shape cannot match the
    /// signature. Arguments of unknown length (`*args` of an unknown
    /// sequence, any `**kwargs`) fill the remaining parameters with
    /// unsolvable values instead.
    pub(crate) fn map_args(
        &mut self,
        func: &InterpreterFunction,
        args: &CallArgs,
        node: CfgNodeId,
    ) -> Option<IndexMap<String, VariableId>> {
        let code = func.code.clone();
        let positional = code.positional_params();
        let kwonly = code.kwonly_params();
        let posonly = code.posonlyargcount as usize;

        let mut posargs = args.posargs.clone();
        let mut unknown_positional = false;
        if let Some(star) = args.starargs {
            match self.sequence_elements(star) {
                Some(elements) => posargs.extend(elements),
                None => unknown_positional = true,
            }
        }
        let unknown_keywords = args.starstarargs.is_some();

        let mut params: IndexMap<String, VariableId> = IndexMap::new();
        let mut extra = Vec::new();
        for (i, arg) in posargs.into_iter().enumerate() {
            match positional.get(i) {
                Some(name) => {
                    params.insert(name.clone(), arg);
                }
                None => extra.push(arg),
            }
        }

        match code.varargs_name() {
            Some(name) => {
                let tuple = if unknown_positional {
                    let tuple_class = self.ctx.converter.classes.tuple;
                    self.ctx.converter.instance_of(&mut self.ctx.values, tuple_class)
                } else {
                    self.ctx.converter.new_tuple(&mut self.ctx.values, extra)
                };
                let var = self.new_var(&[tuple], &[], node);
                params.insert(name.to_string(), var);
            }
            None if !extra.is_empty() => {
                let given = positional.len() + extra.len();
                self.report(
                    ErrorKind::WrongArgCount,
                    format!(
                        "Function {} expects {} arg(s), got {}",
                        func.name,
                        positional.len(),
                        given
                    ),
                );
                return None;
            }
            None => {}
        }

        let mut kwargs: Vec<VariableId> = Vec::new();
        for (key, var) in &args.namedargs {
            let position = positional.iter().position(|p| p == key);
            let by_keyword = match position {
                Some(i) => i >= posonly,
                None => kwonly.iter().any(|k| k == key),
            };
            if by_keyword {
                if params.contains_key(key) {
                    self.report(
                        ErrorKind::DuplicateKeyword,
                        format!(
                            "Function {} got multiple values for keyword argument '{key}'",
                            func.name
                        ),
                    );
                    return None;
                }
                params.insert(key.clone(), *var);
            } else if code.varkeywords_name().is_some() {
                kwargs.push(*var);
            } else {
                self.report(
                    ErrorKind::WrongKeywordArgs,
                    format!("Invalid keyword argument {key} to function {}", func.name),
                );
                return None;
            }
        }
        if let Some(name) = code.varkeywords_name() {
            let dict = self.ctx.converter.new_dict(&mut self.ctx.values);
            let var = self.new_var(&[dict], &[], node);
            params.insert(name.to_string(), var);
        }

        // Defaults align with the last positional parameters.
        let first_default = positional.len().saturating_sub(func.defaults.len());
        for (i, name) in positional.iter().enumerate() {
            if params.contains_key(name) {
                continue;
            }
            if i >= first_default {
                if let Some(default) = func.defaults.get(i - first_default) {
                    params.insert(name.clone(), *default);
                    continue;
                }
            }
            if unknown_positional || unknown_keywords {
                let fill = self.unsolvable(node);
                params.insert(name.clone(), fill);
                continue;
            }
            self.report(
                ErrorKind::MissingParameter,
                format!("Missing parameter '{name}' in call to function {}", func.name),
            );
            return None;
        }
        for name in kwonly {
            if params.contains_key(name) {
                continue;
            }
            if let Some(default) = func.kw_defaults.get(name) {
                params.insert(name.clone(), *default);
                continue;
            }
            if unknown_keywords {
                let fill = self.unsolvable(node);
                params.insert(name.clone(), fill);
                continue;
            }
            self.report(
                ErrorKind::MissingParameter,
                format!("Missing parameter '{name}' in call to function {}", func.name),
            );
            return None;
        }

        debug!(
            function = %func.name,
            params = params.len(),
            extra_kwargs = kwargs.len(),
            "Mapped call arguments"
        );
        Some(params)
    }

    /// Element variables of a tuple or list display with one binding
    pub(crate) fn sequence_elements(&self, var: VariableId) -> Option<Vec<VariableId>> {
        match self.data(var).as_slice() {
            [single] => self
                .ctx
                .values
                .instance(*single)
                .and_then(|i| i.elements.clone()),
            _ => None,
        }
    }
}
