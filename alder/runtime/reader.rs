//! The reader: source text to list forms.
//!
//! A recursive-descent reader over a byte string. Produces cons-linked forms
//! through the task heap and records, for each list cons, the source location
//! of its `car` in the current module's source map.
//!
//! Postfix sugar: `X.y` reads as `(. y X)`, `X[i]` as `(X i)`, and a trailing
//! `:T` as `(: X T)`.

use alder_gc::Any;

use crate::runtime::error::{SourceError, SourceLoc, SourceResult};
use crate::runtime::ops::{new_bool, new_f64, new_i64};
use crate::runtime::symbol::intern;
use crate::runtime::task::Task;
use crate::runtime::values::{cons_ptr, new_cons, new_string};

/// Read one form from `text`.
pub fn read(task: &mut Task, text: &str) -> SourceResult<Any> {
    Reader::new(task, text).read_form()
}

/// Read every form in `text`, as if the input were wrapped in one list.
pub fn read_all(task: &mut Task, text: &str) -> SourceResult<Vec<Any>> {
    let mut reader = Reader::new(task, text);
    let mut forms = Vec::new();
    loop {
        reader.skip_space();
        if reader.peek(0) == 0 {
            return Ok(forms);
        }
        forms.push(reader.read_form()?);
    }
}

fn is_upper(ch: u8) -> bool {
    ch.is_ascii_uppercase()
}

fn is_lower(ch: u8) -> bool {
    ch.is_ascii_lowercase()
}

fn is_alpha(ch: u8) -> bool {
    is_upper(ch) || is_lower(ch)
}

fn is_digit(ch: u8) -> bool {
    ch.is_ascii_digit()
}

fn is_alphanum(ch: u8) -> bool {
    is_alpha(ch) || is_digit(ch)
}

fn is_symchar(ch: u8) -> bool {
    matches!(
        ch,
        b'_' | b'-' | b'=' | b'+' | b'*' | b'/' | b'?' | b'!' | b'&' | b'%' | b'^' | b'~'
    )
}

struct Reader<'t, 's> {
    task: &'t mut Task,
    text: &'s [u8],
    pos: usize,
    loc: SourceLoc,
    scratch: Vec<u8>,
}

impl<'t, 's> Reader<'t, 's> {
    fn new(task: &'t mut Task, text: &'s str) -> Reader<'t, 's> {
        Reader {
            task,
            text: text.as_bytes(),
            pos: 0,
            loc: SourceLoc::default(),
            scratch: Vec::new(),
        }
    }

    fn error(&self, message: impl Into<String>) -> SourceError {
        SourceError::new(self.loc, message)
    }

    /// Byte at `offset` past the current position; 0 at end of input.
    fn peek(&self, offset: usize) -> u8 {
        self.text.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn step(&mut self) {
        self.loc.col += 1;
        self.pos += 1;
    }

    /// Step over a byte that may be part of a newline. `\r`, `\n` and `\r\n`
    /// all advance the line and reset the column.
    fn space_step(&mut self) {
        match self.peek(0) {
            b'\r' if self.peek(1) != b'\n' => {
                self.loc.line += 1;
                self.loc.col = 0;
                self.pos += 1;
            }
            b'\n' => {
                self.loc.line += 1;
                self.loc.col = 0;
                self.pos += 1;
            }
            _ => self.step(),
        }
    }

    fn skip_space(&mut self) {
        loop {
            match self.peek(0) {
                b' ' | b'\t' | b'\x0c' | b'\x0b' | b'\r' | b'\n' => self.space_step(),
                b';' => loop {
                    // line comment
                    self.space_step();
                    let ch = self.peek(0);
                    if ch == 0 || ch == b'\n' || ch == b'\r' {
                        break;
                    }
                },
                _ => return,
            }
        }
    }

    fn expect_delim(&self) -> SourceResult<()> {
        match self.peek(0) {
            b' ' | b'\t' | b'\x0c' | b'\x0b' | b'\r' | b'\n' | b'.' | b':' | b'(' | b')'
            | b'[' | b']' | 0 => Ok(()),
            _ => Err(self.error("expected delimiter after expression")),
        }
    }

    fn scratch_str(&self) -> SourceResult<&str> {
        std::str::from_utf8(&self.scratch).map_err(|_| self.error("invalid utf-8 in input"))
    }

    fn read_string(&mut self) -> SourceResult<Any> {
        self.scratch.clear();
        loop {
            let ch = self.peek(0);
            match ch {
                b'"' => {
                    self.step();
                    let text = self.scratch_str()?.to_owned();
                    return Ok(new_string(self.task, &text));
                }
                b'\\' => {
                    self.step();
                    let escaped = match self.peek(0) {
                        0 => {
                            return Err(self.error("unexpected end of input while reading string"))
                        }
                        b'\'' => b'\'',
                        b'"' => b'"',
                        b'?' => b'?',
                        b'\\' => b'\\',
                        b'a' => 0x07,
                        b'b' => 0x08,
                        b'f' => 0x0c,
                        b'n' => b'\n',
                        b'r' => b'\r',
                        b't' => b'\t',
                        b'v' => 0x0b,
                        other => {
                            return Err(self
                                .error(format!("unexpected escape char: {}", other as char)))
                        }
                    };
                    self.scratch.push(escaped);
                    self.step();
                }
                0 => return Err(self.error("unexpected end of input while reading string")),
                b'\r' | b'\n' => {
                    self.space_step();
                    self.scratch.push(ch);
                }
                _ => {
                    self.step();
                    self.scratch.push(ch);
                }
            }
        }
    }

    fn read_symbol(&mut self) -> SourceResult<Any> {
        self.scratch.clear();
        loop {
            let ch = self.peek(0);
            if !is_alphanum(ch) && !is_symchar(ch) {
                if self.scratch.is_empty() {
                    return Err(self.error("expected a symbol"));
                }
                let name = self.scratch_str()?;
                return Ok(intern(name));
            }
            self.scratch.push(ch);
            self.step();
        }
    }

    fn read_number(&mut self) -> SourceResult<Any> {
        let start = self.pos;
        let mut end = self.pos;
        if matches!(self.text.get(end), Some(b'+' | b'-')) {
            end += 1;
        }

        if self.peek(end - self.pos) == b'0' && matches!(self.peek(end - self.pos + 1), b'x' | b'X')
        {
            let digits_start = end + 2;
            end = digits_start;
            while self.text.get(end).copied().is_some_and(|ch| ch.is_ascii_hexdigit()) {
                end += 1;
            }
            if end == digits_start {
                return Err(self.error("error parsing number"));
            }
            let negative = self.text[start] == b'-';
            let digits = std::str::from_utf8(&self.text[digits_start..end])
                .map_err(|_| self.error("error parsing number"))?;
            let magnitude =
                i64::from_str_radix(digits, 16).map_err(|_| self.error("number too large"))?;
            self.loc.col += (end - start) as u32;
            self.pos = end;
            return Ok(new_i64(if negative { -magnitude } else { magnitude }));
        }

        let digits_start = end;
        while self.text.get(end).copied().is_some_and(is_digit) {
            end += 1;
        }
        if end == digits_start {
            return Err(self.error("error parsing number"));
        }

        if self.text.get(end) != Some(&b'.') {
            let literal = std::str::from_utf8(&self.text[start..end])
                .map_err(|_| self.error("error parsing number"))?;
            let value: i64 =
                literal.parse().map_err(|_| self.error("number too large"))?;
            self.loc.col += (end - start) as u32;
            self.pos = end;
            return Ok(new_i64(value));
        }

        // Re-parse as a float: fraction digits and an optional exponent.
        end += 1;
        while self.text.get(end).copied().is_some_and(is_digit) {
            end += 1;
        }
        if matches!(self.text.get(end), Some(b'e' | b'E')) {
            let mut exp_end = end + 1;
            if matches!(self.text.get(exp_end), Some(b'+' | b'-')) {
                exp_end += 1;
            }
            let exp_digits = exp_end;
            while self.text.get(exp_end).copied().is_some_and(is_digit) {
                exp_end += 1;
            }
            if exp_end > exp_digits {
                end = exp_end;
            }
        }
        let literal = std::str::from_utf8(&self.text[start..end])
            .map_err(|_| self.error("error parsing number"))?;
        let value: f64 = literal.parse().map_err(|_| self.error("error parsing number"))?;
        self.loc.col += (end - start) as u32;
        self.pos = end;
        Ok(new_f64(value))
    }

    fn read_list(&mut self, end: u8) -> SourceResult<Any> {
        self.skip_space();
        if self.peek(0) == end {
            self.step();
            return Ok(Any::nil());
        }

        let car_loc = self.loc;
        let form = self.read_form()?;
        let rest = self.read_list(end)?;
        let result = new_cons(self.task, form, rest);
        // Store the location of every car form, keyed by the containing cons.
        self.task
            .module
            .record_source_loc(cons_ptr(result).as_ptr(), car_loc);
        Ok(result)
    }

    fn read_form(&mut self) -> SourceResult<Any> {
        self.skip_space();
        let ch = self.peek(0);
        let mut result = if ch == b'(' {
            self.step();
            self.read_list(b')')?
        } else if ch == b'#' {
            self.step();
            match self.peek(0) {
                b't' => {
                    self.step();
                    self.expect_delim()?;
                    new_bool(true)
                }
                b'f' => {
                    self.step();
                    self.expect_delim()?;
                    new_bool(false)
                }
                _ => return Err(self.error("expected #t or #f")),
            }
        } else if ch == b'\'' {
            self.step();
            let form = self.read_form()?;
            let quoted = new_cons(self.task, form, Any::nil());
            new_cons(self.task, intern("quote"), quoted)
        } else if ch == b'"' {
            self.step();
            self.read_string()?
        } else if is_alpha(ch) || is_symchar(ch) {
            self.read_symbol()?
        } else if is_digit(ch) || ((ch == b'+' || ch == b'-') && is_digit(self.peek(1))) {
            let number = self.read_number()?;
            self.expect_delim()?;
            number
        } else {
            return Err(self.error("expected an expression"));
        };

        let mut ch;
        loop {
            self.skip_space();
            ch = self.peek(0);
            if ch == b'.' {
                // X.y reads as (. y X)
                self.step();
                self.skip_space();
                let field = self.read_symbol()?;
                let subject = new_cons(self.task, result, Any::nil());
                let rest = new_cons(self.task, field, subject);
                result = new_cons(self.task, intern("."), rest);
            } else if ch == b'[' {
                // X[i ...] reads as (X i ...)
                self.step();
                let args = self.read_list(b']')?;
                result = new_cons(self.task, result, args);
            } else {
                break;
            }
        }
        if ch == b':' {
            // X:T reads as (: X T)
            self.step();
            let type_form = self.read_form()?;
            let rest = new_cons(self.task, type_form, Any::nil());
            let subject = new_cons(self.task, result, rest);
            result = new_cons(self.task, intern(":"), subject);
        }
        Ok(result)
    }
}
