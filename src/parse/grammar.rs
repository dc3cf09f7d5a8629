use winnow::ascii::till_line_ending;
use winnow::combinator::{alt, cut_err, opt, preceded, repeat};
use winnow::error::{ModalResult, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::take_while;

use crate::{DefaultPolicy, PolicyExpr, PolicyTarget};

use super::parser::ParsedPolicy;

// -- Whitespace & comments --------------------------------------------------

fn ws(input: &mut &str) -> ModalResult<()> {
    let _: () = repeat(
        0..,
        alt((
            take_while(1.., |c: char| c.is_ascii_whitespace()).void(),
            ('#', till_line_ending).void(),
        )),
    )
    .parse_next(input)?;
    Ok(())
}

// -- Identifiers & keywords -------------------------------------------------

fn ident<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1, |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

/// Keywords are accepted in lower case or all upper case.
fn is_keyword(s: &str, word: &str) -> bool {
    s == word || (s.eq_ignore_ascii_case(word) && !s.bytes().any(|b| b.is_ascii_lowercase()))
}

fn is_operator(s: &str) -> bool {
    is_keyword(s, "and") || is_keyword(s, "or") || is_keyword(s, "not")
}

fn keyword<'i>(word: &'static str) -> impl FnMut(&mut &'i str) -> ModalResult<()> {
    move |input: &mut &'i str| {
        ident
            .verify(|s: &str| is_keyword(s, word))
            .void()
            .parse_next(input)
    }
}

// -- Expressions (precedence: OR < AND < NOT < primary) ---------------------

fn call_args(input: &mut &str) -> ModalResult<Vec<PolicyExpr>> {
    let first = expr(input)?;
    let rest: Vec<PolicyExpr> = repeat(0.., preceded((ws, ','), cut_err(expr))).parse_next(input)?;
    (ws, cut_err(')')).parse_next(input)?;
    let mut items = Vec::with_capacity(rest.len() + 1);
    items.push(first);
    items.extend(rest);
    Ok(items)
}

fn term(input: &mut &str) -> ModalResult<PolicyExpr> {
    let name = ident
        .verify(|s: &str| !is_operator(s))
        .parse_next(input)?;

    if is_keyword(name, "allow") {
        return Ok(PolicyExpr::Allow);
    }
    if is_keyword(name, "deny") {
        return Ok(PolicyExpr::Deny);
    }

    let is_chain = is_keyword(name, "chain");
    if is_chain || is_keyword(name, "race") {
        let mut lookahead = *input;
        ws(&mut lookahead)?;
        if let Some(rest) = lookahead.strip_prefix('(') {
            *input = rest;
            let items = cut_err(call_args).parse_next(input)?;
            return Ok(if is_chain {
                PolicyExpr::Chain(items)
            } else {
                PolicyExpr::Race(items)
            });
        }
    }

    Ok(PolicyExpr::Ref(name.to_owned()))
}

fn primary(input: &mut &str) -> ModalResult<PolicyExpr> {
    ws.parse_next(input)?;
    alt((
        preceded('(', (expr, ws, cut_err(')'))).map(|(e, (), _)| e),
        term,
    ))
    .context(StrContext::Expected(StrContextValue::Description(
        "rule expression",
    )))
    .parse_next(input)
}

fn unary(input: &mut &str) -> ModalResult<PolicyExpr> {
    ws.parse_next(input)?;
    if opt(keyword("not")).parse_next(input)?.is_some() {
        let inner = cut_err(unary).parse_next(input)?;
        Ok(PolicyExpr::Not(Box::new(inner)))
    } else {
        primary(input)
    }
}

fn flatten(first: PolicyExpr, rest: Vec<PolicyExpr>, wrap: fn(Vec<PolicyExpr>) -> PolicyExpr) -> PolicyExpr {
    if rest.is_empty() {
        return first;
    }
    let mut items = Vec::with_capacity(rest.len() + 1);
    items.push(first);
    items.extend(rest);
    wrap(items)
}

fn and_expr(input: &mut &str) -> ModalResult<PolicyExpr> {
    let first = unary(input)?;
    let rest: Vec<PolicyExpr> =
        repeat(0.., preceded((ws, keyword("and")), cut_err(unary))).parse_next(input)?;
    Ok(flatten(first, rest, PolicyExpr::And))
}

fn or_expr(input: &mut &str) -> ModalResult<PolicyExpr> {
    let first = and_expr(input)?;
    let rest: Vec<PolicyExpr> =
        repeat(0.., preceded((ws, keyword("or")), cut_err(and_expr))).parse_next(input)?;
    Ok(flatten(first, rest, PolicyExpr::Or))
}

fn expr(input: &mut &str) -> ModalResult<PolicyExpr> {
    ws.parse_next(input)?;
    or_expr(input)
}

// -- Statements -------------------------------------------------------------

enum Statement {
    Default(DefaultPolicy),
    Rule(PolicyTarget, PolicyExpr),
}

fn default_stmt(input: &mut &str) -> ModalResult<Statement> {
    keyword("default").parse_next(input)?;
    ws.parse_next(input)?;
    let policy = cut_err(alt((
        keyword("allow").value(DefaultPolicy::AllowByDefault),
        keyword("deny").value(DefaultPolicy::DenyByDefault),
    )))
    .context(StrContext::Expected(StrContextValue::Description(
        "`allow` or `deny`",
    )))
    .parse_next(input)?;
    Ok(Statement::Default(policy))
}

fn rule_body(input: &mut &str) -> ModalResult<PolicyExpr> {
    ws.parse_next(input)?;
    ':'.parse_next(input)?;
    cut_err(expr)
        .context(StrContext::Expected(StrContextValue::Description(
            "rule body",
        )))
        .parse_next(input)
}

fn fallback_stmt(input: &mut &str) -> ModalResult<Statement> {
    keyword("fallback").parse_next(input)?;
    let body = rule_body(input)?;
    Ok(Statement::Rule(PolicyTarget::Fallback, body))
}

fn field_stmt(input: &mut &str) -> ModalResult<Statement> {
    let parent_type = ident.parse_next(input)?;
    '.'.parse_next(input)?;
    let field = cut_err(alt(('*'.value(None), ident.map(Some))))
        .context(StrContext::Expected(StrContextValue::Description(
            "field name or `*`",
        )))
        .parse_next(input)?;

    ws.parse_next(input)?;
    cut_err(':').parse_next(input)?;
    let body = cut_err(expr)
        .context(StrContext::Expected(StrContextValue::Description(
            "rule body",
        )))
        .parse_next(input)?;

    let target = match field {
        Some(field) => PolicyTarget::Field {
            parent_type: parent_type.to_owned(),
            field: field.to_owned(),
        },
        None => PolicyTarget::Type(parent_type.to_owned()),
    };
    Ok(Statement::Rule(target, body))
}

fn statement(input: &mut &str) -> ModalResult<Statement> {
    ws.parse_next(input)?;
    alt((default_stmt, fallback_stmt, field_stmt)).parse_next(input)
}

// -- Top-level parser -------------------------------------------------------

pub fn parse_policy(input: &mut &str) -> ModalResult<ParsedPolicy> {
    let mut parsed = ParsedPolicy::default();

    let statements: Vec<Statement> = repeat(0.., statement).parse_next(input)?;
    for stmt in statements {
        match stmt {
            Statement::Default(policy) => parsed.defaults.push(policy),
            Statement::Rule(target, body) => parsed.rules.push((target, body)),
        }
    }

    ws.parse_next(input)?;

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use crate::parse::parse;

    use super::*;

    fn body(input: &str) -> PolicyExpr {
        let parsed = parse(input).unwrap();
        parsed.rules.into_iter().next().unwrap().1
    }

    fn r(name: &str) -> PolicyExpr {
        PolicyExpr::Ref(name.to_owned())
    }

    #[test]
    fn parse_field_rule() {
        let parsed = parse("Query.me: isAuthenticated").unwrap();
        assert_eq!(parsed.rules.len(), 1);
        assert_eq!(
            parsed.rules[0].0,
            PolicyTarget::Field {
                parent_type: "Query".into(),
                field: "me".into()
            }
        );
        assert_eq!(parsed.rules[0].1, r("isAuthenticated"));
    }

    #[test]
    fn parse_type_wildcard() {
        let parsed = parse("Mutation.*: deny").unwrap();
        assert_eq!(parsed.rules[0].0, PolicyTarget::Type("Mutation".into()));
        assert_eq!(parsed.rules[0].1, PolicyExpr::Deny);
    }

    #[test]
    fn parse_fallback_and_default() {
        let parsed = parse("default allow\nfallback: isAuthenticated").unwrap();
        assert_eq!(parsed.defaults, vec![DefaultPolicy::AllowByDefault]);
        assert_eq!(parsed.rules[0].0, PolicyTarget::Fallback);
    }

    #[test]
    fn parse_uppercase_default() {
        let parsed = parse("DEFAULT DENY").unwrap();
        assert_eq!(parsed.defaults, vec![DefaultPolicy::DenyByDefault]);
    }

    #[test]
    fn parse_and_flattens() {
        assert_eq!(
            body("Query.x: a AND b and c"),
            PolicyExpr::And(vec![r("a"), r("b"), r("c")])
        );
    }

    #[test]
    fn parse_precedence_and_before_or() {
        assert_eq!(
            body("Query.x: a OR b AND c"),
            PolicyExpr::Or(vec![r("a"), PolicyExpr::And(vec![r("b"), r("c")])])
        );
    }

    #[test]
    fn parse_parenthesized_grouping() {
        assert_eq!(
            body("Query.x: (a OR b) AND c"),
            PolicyExpr::And(vec![PolicyExpr::Or(vec![r("a"), r("b")]), r("c")])
        );
    }

    #[test]
    fn parse_not() {
        assert_eq!(
            body("Query.x: NOT not a"),
            PolicyExpr::Not(Box::new(PolicyExpr::Not(Box::new(r("a")))))
        );
    }

    #[test]
    fn keyword_prefix_is_a_reference() {
        assert_eq!(body("Query.x: notify OR android"), PolicyExpr::Or(vec![r("notify"), r("android")]));
    }

    #[test]
    fn parse_chain_and_race_calls() {
        assert_eq!(
            body("Query.x: chain(a, race(b, c))"),
            PolicyExpr::Chain(vec![r("a"), PolicyExpr::Race(vec![r("b"), r("c")])])
        );
    }

    #[test]
    fn chain_without_parens_is_a_reference() {
        assert_eq!(body("Query.x: chain"), r("chain"));
    }

    #[test]
    fn parse_comments_ignored() {
        let parsed = parse("# header\nQuery.me: a # trailing\n# footer\n").unwrap();
        assert_eq!(parsed.rules.len(), 1);
    }

    #[test]
    fn parse_multiple_statements() {
        let input = "default deny\nQuery.me: a\nQuery.*: b\nMutation.deletePost: a AND c\nfallback: allow";
        let parsed = parse(input).unwrap();
        assert_eq!(parsed.rules.len(), 4);
        assert_eq!(parsed.defaults.len(), 1);
    }

    #[test]
    fn missing_colon_is_error() {
        assert!(parse("Query.me isAuthenticated").is_err());
    }

    #[test]
    fn dangling_operator_is_error() {
        assert!(parse("Query.me: a AND").is_err());
        assert!(parse("Query.me: a AND AND b").is_err());
    }

    #[test]
    fn unclosed_call_is_error() {
        assert!(parse("Query.me: chain(a, b").is_err());
    }

    #[test]
    fn bad_default_is_error() {
        assert!(parse("default maybe").is_err());
    }

    #[test]
    fn empty_document() {
        let parsed = parse("  \n# nothing here\n").unwrap();
        assert!(parsed.rules.is_empty());
        assert!(parsed.defaults.is_empty());
    }
}
