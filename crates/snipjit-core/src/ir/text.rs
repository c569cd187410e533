//! Textual IR: a comment manifest followed by CLIF
//!
//! ```text
//! ; snipjit-ir 1
//! ; module "snippet"
//! ; target "x86_64-unknown-linux-gnu"
//! ; declare 0 export "add"
//! ; declare 1 import "sin"
//!
//! function u0:0(i32, i32) -> i32 system_v {
//! ...
//! ```
//!
//! CLIF has no place for symbol names or linkage, so the manifest carries
//! them. Import signatures are recovered from the call sites that use them.

use std::collections::HashMap;
use std::fmt::Write as _;

use cranelift_codegen::ir::{ExternalName, Function, Signature};
use thiserror::Error;

use super::{function_index, DeclLinkage, IrModule};

/// First line of every IR text
pub const HEADER: &str = "; snipjit-ir 1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IrTextError {
    #[error("IR text is not valid UTF-8")]
    NotUtf8,

    #[error("IR text is not newline-terminated")]
    Unterminated,

    #[error("missing '{HEADER}' header")]
    MissingHeader,

    #[error("malformed manifest line {line}: {text}")]
    BadManifest { line: usize, text: String },

    #[error("manifest has no {0} line")]
    MissingField(&'static str),

    #[error("CLIF parse error: {0}")]
    Parse(String),

    #[error("function body names unknown declaration {0}")]
    UnknownDeclaration(u32),

    #[error("no signature found for '{0}'")]
    MissingSignature(String),
}

/// Render a module as IR text (always newline-terminated)
#[must_use]
pub fn to_text(module: &IrModule) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{HEADER}");
    let _ = writeln!(out, "; module \"{}\"", single_line(module.name()));
    let _ = writeln!(out, "; target \"{}\"", module.triple());
    for (index, decl) in module.declarations().iter().enumerate() {
        let _ = writeln!(
            out,
            "; declare {index} {} \"{}\"",
            decl.linkage.as_str(),
            decl.name
        );
    }
    for function in module.functions() {
        let _ = write!(out, "\n{}", function.display());
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn single_line(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}

struct Manifest {
    name: String,
    triple: String,
    declarations: Vec<(String, DeclLinkage)>,
}

/// Text between the first and last double quote
fn quoted(text: &str) -> Option<&str> {
    let start = text.find('"')?;
    let end = text.rfind('"')?;
    (end > start).then(|| &text[start + 1..end])
}

fn parse_manifest(text: &str) -> Result<Manifest, IrTextError> {
    let mut lines = text.lines().enumerate();
    match lines.next() {
        Some((_, line)) if line.trim_end() == HEADER => {}
        _ => return Err(IrTextError::MissingHeader),
    }

    let mut name = None;
    let mut triple = None;
    let mut declarations = Vec::new();
    for (number, line) in lines {
        let Some(body) = line.strip_prefix(';') else { break };
        let body = body.trim();
        let bad = || IrTextError::BadManifest {
            line: number + 1,
            text: line.to_string(),
        };

        if let Some(rest) = body.strip_prefix("module ") {
            name = Some(quoted(rest).ok_or_else(bad)?.to_string());
        } else if let Some(rest) = body.strip_prefix("target ") {
            triple = Some(quoted(rest).ok_or_else(bad)?.to_string());
        } else if let Some(rest) = body.strip_prefix("declare ") {
            let mut parts = rest.splitn(3, ' ');
            let index: usize = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
            let linkage = parts.next().and_then(DeclLinkage::parse).ok_or_else(bad)?;
            let symbol = parts.next().and_then(quoted).ok_or_else(bad)?;
            if index != declarations.len() {
                return Err(bad());
            }
            declarations.push((symbol.to_string(), linkage));
        }
    }

    Ok(Manifest {
        name: name.ok_or(IrTextError::MissingField("module"))?,
        triple: triple.ok_or(IrTextError::MissingField("target"))?,
        declarations,
    })
}

/// Signatures of the declarations each function calls, keyed by index
fn call_signatures(functions: &[Function]) -> HashMap<u32, Signature> {
    let mut found = HashMap::new();
    for function in functions {
        for ext in function.dfg.ext_funcs.values() {
            if let ExternalName::User(reference) = &ext.name {
                let name = &function.params.user_named_funcs()[*reference];
                if name.namespace == 0 {
                    found
                        .entry(name.index)
                        .or_insert_with(|| function.dfg.signatures[ext.signature].clone());
                }
            }
        }
    }
    found
}

/// Parse IR text produced by [`to_text`]
pub fn from_text(bytes: &[u8]) -> Result<IrModule, IrTextError> {
    let text = std::str::from_utf8(bytes).map_err(|_| IrTextError::NotUtf8)?;
    if !text.ends_with('\n') {
        return Err(IrTextError::Unterminated);
    }
    let manifest = parse_manifest(text)?;
    let functions = cranelift_reader::parse_functions(text)
        .map_err(|e| IrTextError::Parse(e.to_string()))?;

    let mut bodies: HashMap<u32, Signature> = HashMap::new();
    for function in &functions {
        let index = function_index(function).unwrap_or(u32::MAX);
        if index as usize >= manifest.declarations.len() {
            return Err(IrTextError::UnknownDeclaration(index));
        }
        bodies.insert(index, function.signature.clone());
    }
    let mut calls = call_signatures(&functions);

    let mut module = IrModule::new(manifest.name, manifest.triple);
    for (index, (name, linkage)) in manifest.declarations.into_iter().enumerate() {
        let index = index as u32;
        let signature = bodies
            .remove(&index)
            .or_else(|| calls.remove(&index))
            .ok_or_else(|| IrTextError::MissingSignature(name.clone()))?;
        module.declare(name, linkage, signature);
    }
    for function in functions {
        module.add_function(function);
    }
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cranelift_codegen::ir::types::I32;
    use cranelift_codegen::ir::{AbiParam, ExtFuncData, InstBuilder, UserExternalName, UserFuncName};
    use cranelift_codegen::isa::CallConv;
    use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};

    const MANIFEST: &str = "; snipjit-ir 1\n; module \"m\"\n; target \"x86_64-unknown-linux-gnu\"\n";

    fn int_sig() -> Signature {
        let mut sig = Signature::new(CallConv::SystemV);
        sig.params.push(AbiParam::new(I32));
        sig.returns.push(AbiParam::new(I32));
        sig
    }

    /// `f(x) = g(x)` where `g` is imported
    fn sample_module() -> IrModule {
        let mut module = IrModule::new("m", "x86_64-unknown-linux-gnu");
        let f = module.declare("f", DeclLinkage::Export, int_sig());
        let g = module.declare("g", DeclLinkage::Import, int_sig());

        let mut function = Function::with_name_signature(UserFuncName::user(0, f), int_sig());
        let mut ctx = FunctionBuilderContext::new();
        {
            let mut builder = FunctionBuilder::new(&mut function, &mut ctx);
            let callee_name = builder
                .func
                .declare_imported_user_function(UserExternalName::new(0, g));
            let signature = builder.import_signature(int_sig());
            let callee = builder.import_function(ExtFuncData {
                name: ExternalName::user(callee_name),
                signature,
                colocated: false,
            });
            let block = builder.create_block();
            builder.append_block_params_for_function_params(block);
            builder.switch_to_block(block);
            builder.seal_block(block);
            let arg = builder.block_params(block)[0];
            let call = builder.ins().call(callee, &[arg]);
            let result = builder.inst_results(call)[0];
            builder.ins().return_(&[result]);
            builder.finalize();
        }
        module.add_function(function);
        module
    }

    #[test]
    fn text_round_trip_keeps_declarations() {
        let module = sample_module();
        let text = to_text(&module);
        assert!(text.starts_with(HEADER));
        assert!(text.contains("; declare 1 import \"g\""));

        let parsed = from_text(text.as_bytes()).unwrap();
        assert_eq!(parsed.name(), "m");
        assert_eq!(parsed.triple(), module.triple());
        assert_eq!(parsed.declarations(), module.declarations());
        assert_eq!(parsed.functions().len(), 1);
        assert_eq!(
            parsed.functions()[0].display().to_string(),
            module.functions()[0].display().to_string()
        );
    }

    #[test]
    fn rejects_unterminated_and_non_utf8() {
        assert_eq!(from_text(b"; snipjit-ir 1"), Err(IrTextError::Unterminated));
        assert_eq!(from_text(&[0xff, b'\n']), Err(IrTextError::NotUtf8));
        assert_eq!(
            from_text(b"function u0:0() system_v {\n}\n"),
            Err(IrTextError::MissingHeader)
        );
    }

    #[test]
    fn rejects_bad_manifest() {
        let text = format!("{MANIFEST}; declare 3 export \"f\"\n");
        assert!(matches!(
            from_text(text.as_bytes()),
            Err(IrTextError::BadManifest { line: 4, .. })
        ));
        let text = "; snipjit-ir 1\n; target \"x\"\n";
        assert_eq!(
            from_text(text.as_bytes()).unwrap_err(),
            IrTextError::MissingField("module")
        );
    }

    #[test]
    fn uncalled_import_has_no_signature() {
        let text = format!("{MANIFEST}; declare 0 import \"lonely\"\n");
        assert_eq!(
            from_text(text.as_bytes()).unwrap_err(),
            IrTextError::MissingSignature("lonely".to_string())
        );
    }
}
