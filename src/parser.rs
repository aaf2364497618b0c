//! Parser for the text a MySQL-family server prints for `SHOW GRANTS FOR ...`.
//!
//! Each line follows the skeleton
//!
//! ```text
//! GRANT <priv-list> ON [TABLE] <scope> TO <grantee> [REQUIRE <tls>] [WITH GRANT OPTION]
//! GRANT <role> [, <role>] TO <grantee> [WITH ADMIN OPTION]
//! ```
//!
//! Lines are tokenized with the `sqlparser` MySQL dialect, which takes care of
//! quoted names, `user@host` pairs and commas inside column lists.

use std::collections::BTreeSet;

use sqlparser::{
    dialect::MySqlDialect,
    tokenizer::{Token, Tokenizer},
};

use crate::{
    error::GrantError,
    grant::{Grant, GrantKey, Grantee, Scope, TlsOption, WILDCARD},
    privilege::{Privilege, PrivilegeSet},
};

/// One parsed line of `SHOW GRANTS` output.
#[derive(Debug, Clone, PartialEq)]
pub enum GrantLine {
    Privileges {
        grantee: Grantee,
        scope: Scope,
        privileges: PrivilegeSet,
        grant_option: bool,
        tls_option: Option<TlsOption>,
    },
    Roles {
        grantee: Grantee,
        roles: Vec<String>,
    },
    /// A well-formed line this engine does not manage (proxy and routine
    /// grants, MariaDB's `SET DEFAULT ROLE`).
    Unmanaged,
}

pub(crate) struct TokenCursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenCursor {
    pub(crate) fn new(text: &str) -> Result<Self, String> {
        let dialect = MySqlDialect {};
        let tokens = Tokenizer::new(&dialect, text).tokenize().map_err(|e| e.to_string())?;
        let tokens = tokens
            .into_iter()
            .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF))
            .collect();
        Ok(TokenCursor { tokens, pos: 0 })
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn describe(token: Option<&Token>) -> String {
        match token {
            Some(token) => format!("`{}`", token),
            None => "end of line".to_string(),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), String> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(format!("expected {}, found {}", keyword, Self::describe(self.peek())))
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<(), String> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(format!("expected `{}`, found {}", token, Self::describe(self.peek())))
        }
    }

    fn peek_quoted_name(&self) -> bool {
        match self.peek() {
            Some(Token::Word(w)) => w.quote_style.is_some(),
            Some(Token::SingleQuotedString(_)) | Some(Token::DoubleQuotedString(_)) => true,
            _ => false,
        }
    }

    /// A bare or quoted name (`db`, `` `db` ``, `'jdoe'`).
    fn name(&mut self) -> Result<String, String> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w.value),
            Some(Token::SingleQuotedString(s)) | Some(Token::DoubleQuotedString(s)) => Ok(s),
            other => Err(format!("expected a name, found {}", Self::describe(other.as_ref()))),
        }
    }

    /// `name[@host]`; a name without a host is a role.
    fn account(&mut self) -> Result<Grantee, String> {
        // The MySQL dialect reads unquoted `jdoe@localhost` as a single word.
        if let Some(Token::Word(w)) = self.peek() {
            if w.quote_style.is_none() {
                if let Some((name, host)) = w.value.split_once('@') {
                    let grantee = Grantee::user(name, Some(host));
                    self.pos += 1;
                    return Ok(grantee);
                }
            }
        }

        let name = self.name()?;
        if self.eat(&Token::AtSign) {
            let host = self.name()?;
            return Ok(Grantee::user(&name, Some(&host)));
        }
        // After a quoted name, an unquoted host comes through as one `@host` word.
        if let Some(Token::Word(w)) = self.peek() {
            if w.quote_style.is_none() && w.value.starts_with('@') && w.value.len() > 1 {
                let host = w.value[1..].to_string();
                self.pos += 1;
                return Ok(Grantee::user(&name, Some(&host)));
            }
        }
        Ok(Grantee::role(&name))
    }

    /// One privilege: a run of bare words with an optional column list.
    pub(crate) fn privilege(&mut self) -> Result<Privilege, String> {
        let mut words = Vec::new();
        while let Some(Token::Word(w)) = self.peek() {
            if w.quote_style.is_some() || w.value.eq_ignore_ascii_case("ON") {
                break;
            }
            words.push(w.value.clone());
            self.pos += 1;
        }
        if words.is_empty() {
            return Err(format!("expected a privilege, found {}", Self::describe(self.peek())));
        }

        let mut columns = BTreeSet::new();
        if self.eat(&Token::LParen) {
            loop {
                match self.next() {
                    Some(Token::Word(w)) => {
                        columns.insert(w.value);
                    }
                    other => return Err(format!("expected a column name, found {}", Self::describe(other.as_ref()))),
                }
                if self.eat(&Token::Comma) {
                    continue;
                }
                self.expect(&Token::RParen)?;
                break;
            }
        }

        Ok(Privilege::with_columns(&words.join(" "), columns))
    }

    fn privilege_list(&mut self) -> Result<PrivilegeSet, String> {
        let mut privileges = PrivilegeSet::new();
        loop {
            privileges.insert(self.privilege()?);
            if !self.eat(&Token::Comma) {
                return Ok(privileges);
            }
        }
    }

    fn scope_part(&mut self) -> Result<String, String> {
        if self.eat(&Token::Mul) {
            Ok(WILDCARD.to_string())
        } else {
            self.name()
        }
    }

    /// `*.*`, `db.*` or `db.tbl`. `None` for routine grants.
    fn scope(&mut self) -> Result<Option<Scope>, String> {
        if self.eat_keyword("FUNCTION") || self.eat_keyword("PROCEDURE") {
            return Ok(None);
        }
        self.eat_keyword("TABLE");

        let database = self.scope_part()?;
        self.expect(&Token::Period)?;
        let table = self.scope_part()?;
        Ok(Some(Scope::new(&database, &table)))
    }

    fn tls_option(&mut self) -> Result<TlsOption, String> {
        match self.next() {
            Some(Token::Word(w)) if w.quote_style.is_none() => w.value.parse(),
            other => Err(format!("expected a TLS option, found {}", Self::describe(other.as_ref()))),
        }
    }

    /// A quoted credential, or MariaDB's `PASSWORD('...')`.
    fn auth_string(&mut self) -> Result<(), String> {
        if self.eat_keyword("PASSWORD") {
            self.expect(&Token::LParen)?;
            self.auth_string()?;
            return self.expect(&Token::RParen);
        }
        match self.next() {
            Some(Token::SingleQuotedString(_)) | Some(Token::DoubleQuotedString(_)) => Ok(()),
            other => Err(format!("expected a quoted credential, found {}", Self::describe(other.as_ref()))),
        }
    }

    /// Skips `IDENTIFIED BY [PASSWORD] '<str>'` or
    /// `IDENTIFIED {VIA | WITH} <plugin> [{USING | AS} '<str>']`, as printed by
    /// MySQL 5.x and MariaDB. Later clauses are still parsed.
    fn skip_identified(&mut self) -> Result<(), String> {
        if self.eat_keyword("BY") {
            self.eat_keyword("PASSWORD");
            return self.auth_string();
        }
        if self.eat_keyword("VIA") || self.eat_keyword("WITH") {
            self.name()?;
            if self.eat_keyword("USING") || self.eat_keyword("AS") {
                self.auth_string()?;
            }
            return Ok(());
        }
        Err(format!("expected BY, VIA or WITH, found {}", Self::describe(self.peek())))
    }

    /// Clauses after the grantee. Returns `(grant_option, tls_option)`.
    fn trailing_clauses(&mut self) -> Result<(bool, Option<TlsOption>), String> {
        let mut grant_option = false;
        let mut tls_option = None;

        while !self.is_at_end() {
            if self.eat(&Token::SemiColon) {
                continue;
            }
            if self.eat_keyword("REQUIRE") {
                tls_option = Some(self.tls_option()?);
            } else if self.eat_keyword("WITH") {
                continue;
            } else if self.eat_keyword("GRANT") {
                self.expect_keyword("OPTION")?;
                grant_option = true;
            } else if self.eat_keyword("ADMIN") {
                self.expect_keyword("OPTION")?;
            } else if self.eat_keyword("IDENTIFIED") {
                self.skip_identified()?;
            } else if matches!(self.peek(), Some(Token::Word(w)) if w.value.to_uppercase().starts_with("MAX_")) {
                self.pos += 1;
                match self.next() {
                    Some(Token::Number(..)) => {}
                    other => return Err(format!("expected a resource limit, found {}", Self::describe(other.as_ref()))),
                }
            } else {
                return Err(format!("unexpected {}", Self::describe(self.peek())));
            }
        }

        Ok((grant_option, tls_option))
    }

    fn grant_line(&mut self) -> Result<GrantLine, String> {
        if self.eat_keyword("SET") {
            if self.peek_keyword("DEFAULT") {
                return Ok(GrantLine::Unmanaged);
            }
            return Err("expected GRANT".into());
        }
        self.expect_keyword("GRANT")?;

        if self.peek_keyword("PROXY") {
            return Ok(GrantLine::Unmanaged);
        }

        if self.peek_quoted_name() {
            let mut roles = Vec::new();
            loop {
                roles.push(self.account()?.name().to_string());
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect_keyword("TO")?;
            let grantee = self.account()?;
            self.trailing_clauses()?;
            return Ok(GrantLine::Roles { grantee, roles });
        }

        let privileges = self.privilege_list()?;
        self.expect_keyword("ON")?;
        let Some(scope) = self.scope()? else {
            return Ok(GrantLine::Unmanaged);
        };
        self.expect_keyword("TO")?;
        let grantee = self.account()?;
        let (grant_option, tls_option) = self.trailing_clauses()?;

        Ok(GrantLine::Privileges {
            grantee,
            scope,
            privileges,
            grant_option,
            tls_option,
        })
    }
}

/// Parses one line of `SHOW GRANTS` output.
pub fn parse_grant_line(line: &str) -> Result<GrantLine, GrantError> {
    let mut cursor = TokenCursor::new(line).map_err(|e| GrantError::parse(line, e))?;
    cursor.grant_line().map_err(|e| GrantError::parse(line, e))
}

/// Folds a whole `SHOW GRANTS` response into the observed grant for `key`.
///
/// Privilege lines for other scopes are ignored. The TLS requirement is an
/// account property and is taken from whichever line carries it.
pub fn observed_grant(key: &GrantKey, lines: &[String]) -> Result<Grant, GrantError> {
    let mut grant = Grant::empty(key);

    for line in lines {
        match parse_grant_line(line)? {
            GrantLine::Privileges {
                scope,
                privileges,
                grant_option,
                tls_option,
                ..
            } => {
                if let Some(tls_option) = tls_option {
                    if key.grantee.is_user() {
                        grant.tls_option = tls_option;
                    }
                }
                if scope == key.scope {
                    grant.privileges.extend(&privileges);
                    grant.grant_option |= grant_option;
                }
            }
            GrantLine::Roles { roles, .. } => {
                if key.grantee.is_user() {
                    grant.roles.extend(roles);
                }
            }
            GrantLine::Unmanaged => {
                tracing::warn!("Skipping unmanaged grant line for {}: {}", key.grantee, line);
            }
        }
    }

    grant.roles.sort();
    grant.privileges = grant.privileges.normalized(&key.scope);
    Ok(grant)
}

#[cfg(test)]
mod tests {
    use indexmap::IndexSet;

    use super::*;
    use crate::util::sql::build_grant_statements;

    fn privileges(list: &[&str]) -> PrivilegeSet {
        PrivilegeSet::from_privileges(list.iter().map(|p| p.parse::<Privilege>().unwrap()))
    }

    #[test]
    fn test_parse_database_grant_with_tls() {
        let line = parse_grant_line("GRANT SELECT, UPDATE ON `db`.* TO 'user'@'host' REQUIRE SSL").unwrap();
        assert_eq!(
            line,
            GrantLine::Privileges {
                grantee: Grantee::user("user", Some("host")),
                scope: Scope::new("db", "*"),
                privileges: privileges(&["SELECT", "UPDATE"]),
                grant_option: false,
                tls_option: Some(TlsOption::Ssl),
            }
        );
    }

    #[test]
    fn test_parse_usage_is_empty() {
        let GrantLine::Privileges { scope, privileges, .. } = parse_grant_line("GRANT USAGE ON *.* TO 'user'@'host'").unwrap()
        else {
            panic!("expected a privilege line");
        };
        assert_eq!(scope, Scope::Global);
        assert!(privileges.is_empty());
    }

    #[test]
    fn test_parse_column_lists() {
        let line = "GRANT DROP, SELECT (`c1`), INSERT (`c3`, `c4`), REFERENCES (`c5`) ON `tf-test-1`.`tbl` TO `jdoe-tf-test-1`@`example.com` WITH GRANT OPTION";
        let GrantLine::Privileges {
            grantee,
            scope,
            privileges: parsed,
            grant_option,
            ..
        } = parse_grant_line(line).unwrap()
        else {
            panic!("expected a privilege line");
        };
        assert_eq!(grantee, Grantee::user("jdoe-tf-test-1", Some("example.com")));
        assert_eq!(scope, Scope::new("tf-test-1", "tbl"));
        assert_eq!(parsed, privileges(&["DROP", "SELECT (c1)", "INSERT (c4, c3)", "REFERENCES (c5)"]));
        assert!(grant_option);
    }

    #[test]
    fn test_commas_inside_column_lists() {
        let GrantLine::Privileges { privileges: parsed, .. } =
            parse_grant_line("GRANT SELECT (c1, c2), INSERT ON `db`.`t` TO 'u'@'%'").unwrap()
        else {
            panic!("expected a privilege line");
        };
        assert_eq!(parsed.privileges().len(), 2);
    }

    #[test]
    fn test_parse_role_lines() {
        assert_eq!(
            parse_grant_line("GRANT 'TFRole7' TO 'jdoe-x'@'example.com'").unwrap(),
            GrantLine::Roles {
                grantee: Grantee::user("jdoe-x", Some("example.com")),
                roles: vec!["TFRole7".into()],
            }
        );
        assert_eq!(
            parse_grant_line("GRANT `r1`@`%`,`r2`@`%` TO `jdoe`@`localhost` WITH ADMIN OPTION").unwrap(),
            GrantLine::Roles {
                grantee: Grantee::user("jdoe", Some("localhost")),
                roles: vec!["r1".into(), "r2".into()],
            }
        );
    }

    #[test]
    fn test_role_grantee_without_host() {
        let GrantLine::Privileges { grantee, .. } = parse_grant_line("GRANT SELECT ON `db`.* TO 'reader'").unwrap() else {
            panic!("expected a privilege line");
        };
        assert_eq!(grantee, Grantee::role("reader"));
    }

    #[test]
    fn test_unmanaged_lines() {
        for line in [
            "GRANT PROXY ON ''@'' TO 'root'@'localhost' WITH GRANT OPTION",
            "GRANT EXECUTE ON PROCEDURE `db`.`proc` TO 'u'@'%'",
            "SET DEFAULT ROLE `r1` FOR `u`@`%`",
        ] {
            assert_eq!(parse_grant_line(line).unwrap(), GrantLine::Unmanaged, "{line}");
        }
    }

    #[test]
    fn test_legacy_clauses_are_tolerated() {
        let line = "GRANT USAGE ON *.* TO 'u'@'%' IDENTIFIED BY PASSWORD '*0123456789ABCDEF'";
        assert!(matches!(parse_grant_line(line).unwrap(), GrantLine::Privileges { .. }));

        let line = "GRANT USAGE ON *.* TO 'u'@'%' IDENTIFIED VIA ed25519 USING PASSWORD('secret')";
        assert!(matches!(parse_grant_line(line).unwrap(), GrantLine::Privileges { .. }));

        let line = "GRANT SELECT ON `db`.* TO 'u'@'%' WITH MAX_QUERIES_PER_HOUR 10 MAX_USER_CONNECTIONS 2";
        assert!(matches!(parse_grant_line(line).unwrap(), GrantLine::Privileges { .. }));
    }

    #[test]
    fn test_clauses_after_identified_are_kept() {
        for line in [
            "GRANT USAGE ON *.* TO 'u'@'%' IDENTIFIED BY PASSWORD '*0123456789ABCDEF' REQUIRE SSL WITH GRANT OPTION",
            "GRANT USAGE ON *.* TO 'u'@'%' IDENTIFIED WITH mysql_native_password AS '*0123456789ABCDEF' REQUIRE SSL WITH GRANT OPTION",
        ] {
            let GrantLine::Privileges {
                grant_option,
                tls_option,
                ..
            } = parse_grant_line(line).unwrap()
            else {
                panic!("expected a privilege line");
            };
            assert_eq!(tls_option, Some(TlsOption::Ssl), "{line}");
            assert!(grant_option, "{line}");
        }
    }

    #[test]
    fn test_unquoted_hosts() {
        for line in ["GRANT SELECT ON `db`.* TO jdoe@localhost", "GRANT SELECT ON `db`.* TO 'jdoe'@localhost"] {
            let GrantLine::Privileges { grantee, .. } = parse_grant_line(line).unwrap() else {
                panic!("expected a privilege line");
            };
            assert_eq!(grantee, Grantee::user("jdoe", Some("localhost")), "{line}");
        }
    }

    #[test]
    fn test_malformed_lines_fail() {
        for line in [
            "REVOKE SELECT ON `db`.* FROM 'u'@'%'",
            "GRANT SELECT `db`.* TO 'u'@'%'",
            "GRANT SELECT ON `db` TO 'u'@'%'",
            "GRANT SELECT ON `db`.* TO 'u'@'%' REQUIRE ISSUER '/C=SE'",
            "GRANT ON `db`.* TO 'u'@'%'",
            "GRANT USAGE ON *.* TO 'u'@'%' IDENTIFIED REQUIRE SSL",
        ] {
            let err = parse_grant_line(line).unwrap_err();
            assert!(matches!(err, GrantError::Parse { .. }), "{line}");
        }
    }

    #[test]
    fn test_observed_grant_folds_lines() {
        let key = GrantKey {
            grantee: Grantee::user("jdoe", Some("example.com")),
            scope: Scope::new("db", "*"),
        };
        let lines = vec![
            "GRANT USAGE ON *.* TO `jdoe`@`example.com` REQUIRE SSL".to_string(),
            "GRANT SELECT ON `db`.* TO `jdoe`@`example.com`".to_string(),
            "GRANT UPDATE ON `db`.* TO `jdoe`@`example.com`".to_string(),
            "GRANT DELETE ON `other`.* TO `jdoe`@`example.com`".to_string(),
            "GRANT `zeta`@`%`,`alpha`@`%` TO `jdoe`@`example.com`".to_string(),
        ];
        let grant = observed_grant(&key, &lines).unwrap();
        assert_eq!(grant.privileges, privileges(&["SELECT", "UPDATE"]));
        assert_eq!(grant.tls_option, TlsOption::Ssl);
        assert_eq!(grant.roles.iter().collect::<Vec<_>>(), vec!["alpha", "zeta"]);
        assert!(!grant.grant_option);
    }

    #[test]
    fn test_observed_grant_empty_response() {
        let key = GrantKey {
            grantee: Grantee::role("reader"),
            scope: Scope::new("db", "tbl"),
        };
        let grant = observed_grant(&key, &[]).unwrap();
        assert_eq!(grant, Grant::empty(&key));
    }

    #[test]
    fn test_render_then_parse_round_trip() {
        let grant = Grant {
            grantee: Grantee::user("jdoe-x", Some("example.com")),
            scope: Scope::new("db", "tbl"),
            privileges: privileges(&["DROP", "SELECT (c1)", "INSERT(c4,c3)", "REFERENCES(c5)"]),
            grant_option: true,
            tls_option: TlsOption::X509,
            roles: IndexSet::from(["TFRole7".to_string()]),
        };
        let lines = build_grant_statements(&grant);
        assert_eq!(lines.len(), 2);
        assert_eq!(observed_grant(&grant.key(), &lines).unwrap(), grant);
    }
}
