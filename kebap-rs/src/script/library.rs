//! Library object types available to every script: `InputFile`,
//! `OutputFile` and `Regex`.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};

use regex::Regex;

use super::error::{ScriptError, ScriptResult};
use super::list::List;
use super::object::{Console, ObjectPrototype, ObjectRegistry};
use super::value::Value;

/// Register the library object types with `registry`.
pub fn register_library_objects(registry: &mut ObjectRegistry) {
    registry.register(Box::new(InputFile::default()));
    registry.register(Box::new(OutputFile::default()));
    registry.register(Box::new(RegexObject::default()));
}

fn io_error(action: &str, path: &str, e: std::io::Error) -> ScriptError {
    ScriptError::structural(format!("cannot {action} '{path}': {e}"))
}

fn path_arg(type_name: &str, args: &[Value]) -> ScriptResult<String> {
    match args.first() {
        Some(v) => v.as_string(),
        None => Err(ScriptError::type_error(format!("{type_name} expects a file name"))),
    }
}

// ── InputFile ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InputFile {
    path: String,
    reader: Option<BufReader<File>>,
    at_eof: bool,
}

impl InputFile {
    fn read_line(&mut self) -> ScriptResult<Value> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(ScriptError::structural(format!("'{}' is not open", self.path)));
        };
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .map_err(|e| io_error("read", &self.path, e))?;
        if n == 0 {
            self.at_eof = true;
            return Ok(Value::Str(String::new()));
        }
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        if reader.fill_buf().map(|b| b.is_empty()).unwrap_or(true) {
            self.at_eof = true;
        }
        Ok(Value::Str(line))
    }
}

impl ObjectPrototype for InputFile {
    fn type_name(&self) -> &str {
        "InputFile"
    }

    fn clone_object(&self) -> Box<dyn ObjectPrototype> {
        Box::new(InputFile::default())
    }

    fn construct(&mut self, args: &[Value]) -> ScriptResult<()> {
        if args.len() != 1 {
            return Err(ScriptError::type_error("InputFile expects one argument"));
        }
        self.path = path_arg("InputFile", args)?;
        let file = File::open(&self.path).map_err(|e| io_error("open", &self.path, e))?;
        let mut reader = BufReader::new(file);
        self.at_eof = reader.fill_buf().map(|b| b.is_empty()).unwrap_or(true);
        self.reader = Some(reader);
        tracing::debug!(path = %self.path, "opened input file");
        Ok(())
    }

    fn destruct(&mut self) {
        self.reader = None;
    }

    fn method_names(&self) -> &[&'static str] {
        &["getLine", "eof", "close"]
    }

    fn invoke(&mut self, method: usize, _args: &[Value], _console: &mut Console) -> ScriptResult<Value> {
        match method {
            0 => self.read_line(),
            1 => Ok(Value::Bool(self.at_eof || self.reader.is_none())),
            _ => {
                self.reader = None;
                Ok(Value::Void)
            }
        }
    }

    fn property_names(&self) -> &[&'static str] {
        &["name"]
    }

    fn property(&self, _id: usize) -> ScriptResult<Value> {
        Ok(Value::Str(self.path.clone()))
    }
}

// ── OutputFile ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct OutputFile {
    path: String,
    writer: Option<BufWriter<File>>,
}

impl OutputFile {
    fn write_text(&mut self, text: &str) -> ScriptResult<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(ScriptError::structural(format!("'{}' is not open", self.path)));
        };
        writer
            .write_all(text.as_bytes())
            .map_err(|e| io_error("write", &self.path, e))
    }

    fn close(&mut self) -> ScriptResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|e| io_error("flush", &self.path, e))?;
        }
        Ok(())
    }
}

impl ObjectPrototype for OutputFile {
    fn type_name(&self) -> &str {
        "OutputFile"
    }

    fn clone_object(&self) -> Box<dyn ObjectPrototype> {
        Box::new(OutputFile::default())
    }

    fn construct(&mut self, args: &[Value]) -> ScriptResult<()> {
        if args.is_empty() || args.len() > 2 {
            return Err(ScriptError::type_error("OutputFile expects one or two arguments"));
        }
        self.path = path_arg("OutputFile", args)?;
        let append = match args.get(1) {
            Some(mode) => mode.as_string()?.starts_with('a'),
            None => false,
        };
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .append(append)
            .truncate(!append)
            .open(&self.path)
            .map_err(|e| io_error("open", &self.path, e))?;
        self.writer = Some(BufWriter::new(file));
        tracing::debug!(path = %self.path, append, "opened output file");
        Ok(())
    }

    fn destruct(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "closing output file");
        }
    }

    fn method_names(&self) -> &[&'static str] {
        &["put", "putLine", "close"]
    }

    fn invoke(&mut self, method: usize, args: &[Value], _console: &mut Console) -> ScriptResult<Value> {
        match method {
            0 | 1 => {
                let mut text: String = args.iter().map(ToString::to_string).collect();
                if method == 1 {
                    text.push('\n');
                }
                self.write_text(&text)?;
            }
            _ => self.close()?,
        }
        Ok(Value::Void)
    }

    fn property_names(&self) -> &[&'static str] {
        &["name"]
    }

    fn property(&self, _id: usize) -> ScriptResult<Value> {
        Ok(Value::Str(self.path.clone()))
    }
}

// ── Regex ─────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RegexObject {
    regex: Option<Regex>,
}

impl RegexObject {
    fn compiled(&self) -> ScriptResult<&Regex> {
        self.regex
            .as_ref()
            .ok_or_else(|| ScriptError::structural("Regex has no pattern"))
    }

    fn subject(args: &[Value], method: &str) -> ScriptResult<String> {
        match args.first() {
            Some(v) => v.as_string(),
            None => Err(ScriptError::type_error(format!("Regex.{method}() expects a string"))),
        }
    }

    fn is_match(&self, args: &[Value]) -> ScriptResult<Value> {
        Ok(Value::Bool(self.compiled()?.is_match(&Self::subject(args, "match")?)))
    }
}

impl ObjectPrototype for RegexObject {
    fn type_name(&self) -> &str {
        "Regex"
    }

    fn clone_object(&self) -> Box<dyn ObjectPrototype> {
        Box::new(RegexObject::default())
    }

    fn construct(&mut self, args: &[Value]) -> ScriptResult<()> {
        let [pattern] = args else {
            return Err(ScriptError::type_error("Regex expects one pattern argument"));
        };
        let pattern = pattern.as_string()?;
        let regex = Regex::new(&pattern)
            .map_err(|e| ScriptError::syntax(format!("invalid regex '{pattern}': {e}")))?;
        self.regex = Some(regex);
        Ok(())
    }

    fn method_names(&self) -> &[&'static str] {
        &["match", "find", "replace"]
    }

    fn invoke(&mut self, method: usize, args: &[Value], _console: &mut Console) -> ScriptResult<Value> {
        match method {
            0 => self.is_match(args),
            1 => {
                let subject = Self::subject(args, "find")?;
                let mut out = List::new();
                if let Some(caps) = self.compiled()?.captures(&subject) {
                    for group in caps.iter() {
                        out.push_value(Value::Str(
                            group.map(|m| m.as_str().to_owned()).unwrap_or_default(),
                        ));
                    }
                }
                Ok(Value::List(out))
            }
            _ => {
                let subject = Self::subject(args, "replace")?;
                let replacement = match args.get(1) {
                    Some(r) => r.as_string()?,
                    None => {
                        return Err(ScriptError::type_error(
                            "Regex.replace() expects a subject and a replacement",
                        ))
                    }
                };
                Ok(Value::Str(
                    self.compiled()?
                        .replace_all(&subject, replacement.as_str())
                        .into_owned(),
                ))
            }
        }
    }

    fn operator(&mut self, op: &str, args: &[Value], _console: &mut Console) -> ScriptResult<Option<Value>> {
        match op {
            "()" => self.is_match(args).map(Some),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ObjectRegistry {
        let mut r = ObjectRegistry::new();
        register_library_objects(&mut r);
        r
    }

    #[test]
    fn write_then_read_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let path_str = path.to_str().unwrap().to_owned();
        let r = registry();
        let mut console = Console::default();
        {
            let out = r.instantiate("OutputFile", &[Value::from(path_str.as_str())]).unwrap();
            out.invoke_by_name("putLine", &[Value::from("one")], &mut console).unwrap();
            out.invoke_by_name("put", &[Value::from("two"), Value::Long(2)], &mut console)
                .unwrap();
        }
        let input = r.instantiate("InputFile", &[Value::from(path_str.as_str())]).unwrap();
        assert_eq!(input.property("name").unwrap(), Value::from(path_str.as_str()));
        assert_eq!(input.invoke_by_name("eof", &[], &mut console).unwrap(), Value::Bool(false));
        assert_eq!(input.invoke_by_name("getLine", &[], &mut console).unwrap(), Value::from("one"));
        assert_eq!(input.invoke_by_name("getLine", &[], &mut console).unwrap(), Value::from("two2"));
        assert_eq!(input.invoke_by_name("eof", &[], &mut console).unwrap(), Value::Bool(true));
    }

    #[test]
    fn missing_input_file() {
        let err = registry()
            .instantiate("InputFile", &[Value::from("/nonexistent/kebap/file")])
            .unwrap_err();
        assert!(err.message().contains("cannot open"));
    }

    #[test]
    fn regex_match_find_replace() {
        let r = registry();
        let mut console = Console::default();
        let re = r.instantiate("Regex", &[Value::from(r"(\d+)-(\d+)")]).unwrap();
        assert_eq!(
            re.invoke_by_name("match", &[Value::from("a 1-2")], &mut console).unwrap(),
            Value::Bool(true)
        );
        let found = re.invoke_by_name("find", &[Value::from("x 10-20")], &mut console).unwrap();
        assert_eq!(found.to_string(), "{\"10-20\",\"10\",\"20\"}");
        let replaced = re
            .invoke_by_name("replace", &[Value::from("1-2 and 3-4"), Value::from("$2:$1")], &mut console)
            .unwrap();
        assert_eq!(replaced, Value::from("2:1 and 4:3"));
        assert_eq!(
            re.operator("()", &[Value::from("none")], &mut console).unwrap(),
            Some(Value::Bool(false))
        );
        assert!(r.instantiate("Regex", &[Value::from("(")]).is_err());
    }
}
