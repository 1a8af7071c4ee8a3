// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Textual IR serialization, the golden-test surface.
//!
//! Every node prints as `TYPE(args…)` with children on their own lines,
//! indented two spaces per level. `MATCH` prints its default case first,
//! then the numbered cases. Compiling the same schema twice must produce
//! byte-identical output.

use std::fmt::Write as _;

use super::{Expr, Frame, Stmt};
use crate::cnode::matchset_text;

/// Serialize a statement tree. The result ends with a newline.
pub fn dump(stmt: &Stmt) -> String {
    let mut buf = String::new();
    dump_stmt(&mut buf, stmt, 0);
    buf.push('\n');
    buf
}

fn indent(buf: &mut String, n: usize) {
    for _ in 0..n {
        buf.push(' ');
    }
}

fn dump_stmt_list_inner(buf: &mut String, stmts: &[Stmt], ind: usize) {
    for (i, stmt) in stmts.iter().enumerate() {
        dump_stmt(buf, stmt, ind + 2);
        buf.push_str(if i + 1 < stmts.len() { ",\n" } else { "\n" });
    }
}

fn dump_frame_section(buf: &mut String, name: &str, lines: Vec<String>, ind: usize) {
    if lines.is_empty() {
        return;
    }
    indent(buf, ind + 2);
    let _ = write!(buf, "{name}[\n");
    for (i, line) in lines.iter().enumerate() {
        indent(buf, ind + 4);
        buf.push_str(line);
        buf.push_str(if i + 1 < lines.len() { ",\n" } else { "\n" });
    }
    indent(buf, ind + 2);
    buf.push_str("],\n");
}

fn dump_frame(buf: &mut String, frame: &Frame, ind: usize) {
    buf.push_str("FRAME(\n");

    let counters = frame
        .counters
        .iter()
        .map(|c| format!("COUNTER({}, \"{}_{}\")", c.ind, c.label, c.ind))
        .collect();
    dump_frame_section(buf, "COUNTERS", counters, ind);

    let matchers = frame
        .matchers
        .iter()
        .map(|m| format!("MATCHER({}, \"{}_{}\")", m.ind, m.name, m.ind))
        .collect();
    dump_frame_section(buf, "MATCHERS", matchers, ind);

    let bitvecs = frame
        .bitvecs
        .iter()
        .map(|b| format!("BITVECTOR({}, \"{}_{}\", nbits={})", b.ind, b.label, b.ind, b.nbits))
        .collect();
    dump_frame_section(buf, "BITVECS", bitvecs, ind);

    dump_stmt_list_inner(buf, &frame.stmts, ind);
    indent(buf, ind);
    buf.push(')');
}

fn dump_stmt(buf: &mut String, stmt: &Stmt, ind: usize) {
    indent(buf, ind);
    match stmt {
        Stmt::Invalid(code) => {
            let _ = write!(buf, "INVALID({}, \"{}\")", code.code(), code.message());
        }

        Stmt::Nop => buf.push_str("NOP"),
        Stmt::Valid => buf.push_str("VALID"),
        Stmt::Token => buf.push_str("TOKEN"),
        Stmt::Consume => buf.push_str("CONSUME"),

        Stmt::Seq(stmts) => {
            if stmts.is_empty() {
                buf.push_str("SEQ()");
            } else {
                buf.push_str("SEQ(\n");
                dump_stmt_list_inner(buf, stmts, ind);
                indent(buf, ind);
                buf.push(')');
            }
        }

        Stmt::If {
            cond,
            br_true,
            br_false,
        } => {
            buf.push_str("IF(\n");
            dump_expr(buf, cond, ind + 2);
            buf.push_str(",\n");
            dump_stmt(buf, br_true, ind + 2);
            buf.push_str(",\n");
            dump_stmt(buf, br_false, ind + 2);
            buf.push('\n');
            indent(buf, ind);
            buf.push(')');
        }

        Stmt::Frame(frame) => dump_frame(buf, frame, ind),

        Stmt::Loop { name, stmts, .. } => {
            let _ = write!(buf, "LOOP(\"{name}\",\n");
            dump_stmt_list_inner(buf, stmts, ind);
            indent(buf, ind);
            buf.push(')');
        }

        Stmt::Break { name, ind: lind } => {
            let _ = write!(buf, "BREAK(\"{name}_{lind}\")");
        }

        Stmt::Match {
            ind: mind,
            cases,
            default_case,
            ..
        } => {
            let _ = write!(buf, "MATCH({mind},\n");

            indent(buf, ind + 2);
            buf.push_str("DEFAULT_CASE(\n");
            dump_stmt(buf, default_case, ind + 4);
            buf.push('\n');
            indent(buf, ind + 2);
            buf.push_str(if cases.is_empty() { ")\n" } else { "),\n" });

            for (i, case) in cases.iter().enumerate() {
                indent(buf, ind + 2);
                let _ = write!(buf, "CASE({},\n", case.which);
                for ms in &case.matchset {
                    indent(buf, ind + 4);
                    let _ = write!(buf, "{},\n", matchset_text(ms));
                }
                dump_stmt(buf, &case.stmt, ind + 4);
                buf.push('\n');
                indent(buf, ind + 2);
                buf.push(')');
                buf.push_str(if i + 1 < cases.len() { ",\n" } else { "\n" });
            }

            indent(buf, ind);
            buf.push(')');
        }

        Stmt::Incr { label, ind: cind } => {
            let _ = write!(buf, "INCR({cind}, \"{label}_{cind}\")");
        }
        Stmt::Decr { label, ind: cind } => {
            let _ = write!(buf, "DECR({cind}, \"{label}_{cind}\")");
        }

        Stmt::Bset {
            label,
            ind: bind,
            bit,
        } => {
            let _ = write!(buf, "BSET({bind}, \"{label}_{bind}\", bit={bit})");
        }
        Stmt::Bclear {
            label,
            ind: bind,
            bit,
        } => {
            let _ = write!(buf, "BCLEAR({bind}, \"{label}_{bind}\", bit={bit})");
        }
    }
}

fn dump_binary(buf: &mut String, name: &str, left: &Expr, right: &Expr, ind: usize) {
    let _ = write!(buf, "{name}(\n");
    dump_expr(buf, left, ind + 2);
    buf.push_str(",\n");
    dump_expr(buf, right, ind + 2);
    buf.push('\n');
    indent(buf, ind);
    buf.push(')');
}

fn dump_expr(buf: &mut String, expr: &Expr, ind: usize) {
    indent(buf, ind);
    match expr {
        Expr::TokType => buf.push_str("TOK_TYPE"),
        Expr::TokNum => buf.push_str("TOK_NUM"),
        Expr::TokComplete => buf.push_str("TOK_COMPLETE"),
        Expr::TokLen => buf.push_str("TOK_LEN"),

        Expr::Istok(ev) => {
            let _ = write!(buf, "ISTOK(${})", ev.name());
        }

        Expr::Num(v) => {
            let _ = write!(buf, "{v:.1}");
        }
        Expr::Size(n) => {
            let _ = write!(buf, "{n}");
        }
        Expr::Bool(b) => buf.push_str(if *b { "TRUE" } else { "FALSE" }),

        Expr::And(l, r) => dump_binary(buf, "AND", l, r, ind),
        Expr::Or(l, r) => dump_binary(buf, "OR", l, r, ind),
        Expr::Ne(l, r) => dump_binary(buf, "NE", l, r, ind),
        Expr::Lt(l, r) => dump_binary(buf, "LT", l, r, ind),
        Expr::Le(l, r) => dump_binary(buf, "LE", l, r, ind),
        Expr::Eq(l, r) => dump_binary(buf, "EQ", l, r, ind),
        Expr::Ge(l, r) => dump_binary(buf, "GE", l, r, ind),
        Expr::Gt(l, r) => dump_binary(buf, "GT", l, r, ind),

        Expr::Not(sub) => {
            buf.push_str("NOT(\n");
            dump_expr(buf, sub, ind + 2);
            buf.push('\n');
            indent(buf, ind);
            buf.push(')');
        }

        Expr::Isint(sub) => {
            buf.push_str("ISINT(\n");
            dump_expr(buf, sub, ind + 2);
            buf.push('\n');
            indent(buf, ind);
            buf.push(')');
        }

        Expr::Count { label, ind: cind } => {
            let _ = write!(buf, "COUNT({cind}, \"{label}_{cind}\")");
        }
        Expr::Btest {
            label,
            ind: bind,
            bit,
        } => {
            let _ = write!(buf, "BTEST({bind}, \"{label}_{bind}\", bit={bit})");
        }
        Expr::Btestall { label, ind: bind } => {
            let _ = write!(buf, "BTESTALL({bind}, \"{label}_{bind}\")");
        }

        Expr::Split(frames) => {
            if frames.is_empty() {
                buf.push_str("SPLIT()");
            } else {
                buf.push_str("SPLIT(\n");
                dump_stmt_list_inner(buf, frames, ind);
                indent(buf, ind);
                buf.push(')');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::InvalidCode;

    #[test]
    fn leaves_print_bare() {
        assert_eq!(dump(&Stmt::Valid), "VALID\n");
        assert_eq!(dump(&Stmt::Token), "TOKEN\n");
        assert_eq!(
            dump(&Stmt::Invalid(InvalidCode::NotInteger)),
            "INVALID(2, \"number is not an integer\")\n"
        );
    }

    #[test]
    fn if_nests_with_two_space_indent() {
        let stmt = Stmt::If {
            cond: Expr::Isint(Box::new(Expr::TokNum)),
            br_true: Box::new(Stmt::Valid),
            br_false: Box::new(Stmt::Invalid(InvalidCode::NotInteger)),
        };
        let expected = "\
IF(
  ISINT(
    TOK_NUM
  ),
  VALID,
  INVALID(2, \"number is not an integer\")
)
";
        assert_eq!(dump(&stmt), expected);
    }

    #[test]
    fn numbers_print_with_one_decimal() {
        let mut buf = String::new();
        dump_expr(&mut buf, &Expr::Num(10.0), 0);
        assert_eq!(buf, "10.0");

        let mut buf = String::new();
        dump_expr(&mut buf, &Expr::Size(3), 0);
        assert_eq!(buf, "3");
    }

    #[test]
    fn empty_seq_prints_inline() {
        assert_eq!(dump(&Stmt::Seq(Vec::new())), "SEQ()\n");
    }
}
