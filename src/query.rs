//! Query text to term trees.
//!
//! A query is one s-expression: `(function atom*)`, where an atom is a
//! nested term, a `$variable` naming an attribute, a quoted text or an
//! integer. The grammar lives in `query.pest`; this module turns the parse
//! tree into [`Atom`]s and the [`Compiler`] turns those into terms bound to
//! a store.
//!
//! Functions understood by the compiler:
//!
//! | query | matches |
//! |---|---|
//! | `(and t...)`, `(or t...)`, `(not t)` | boolean combinations |
//! | `(limit N t)` | the first N matches of `t` |
//! | `(equal $attr value)` | messages with that attribute value |
//! | `(pos N)` | the N-th newest message of its bout |
//! | `(unique $attr)`, `(bundled)` | the newest message per attribute value, per bout |
//! | `(unbundled B)` | every message of bout B; bouts are never bundled together here, so B stands alone |
//! | `(ns "urn")` | markup messages in that XML namespace |
//! | `(matches "text")` | messages containing every word of the text |
//! | `(author "urn")`, `(seen-by "urn")`, `(title "text")` | indexed facts |
//! | `(number N)` | message N, if known |
//! | `(always)`, `(never)` | everything, nothing |

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::engine::Store;
use crate::error::{EngineError, Result};
use crate::functor::{words, AUTHOR_NAME, BOUT_NUMBER, BOUT_TITLE, NAMESPACE, SEEN_BY, TEXT};
use crate::lattice::LatticeConfig;
use crate::msg::Msg;
use crate::predicate::{
    AlwaysTerm, EqualPred, LimitTerm, MatcherTerm, NeverTerm, NumberTerm, PosPred, UniquePred,
};
use crate::term::{AndTerm, NotTerm, OrTerm, Term};

#[derive(Parser)]
#[grammar = "query.pest"]
struct QueryParser;

// ------------- Atom -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
    Term { function: String, args: Vec<Atom> },
    Variable(String),
    Text(String),
    Number(i128),
}

pub fn parse(query: &str) -> Result<Atom> {
    let mut pairs = QueryParser::parse(Rule::query, query).map_err(|e| EngineError::Parse {
        message: e.to_string(),
    })?;
    let term = pairs
        .next()
        .and_then(|query| query.into_inner().next())
        .ok_or_else(|| EngineError::Parse {
            message: "empty query".to_owned(),
        })?;
    atom(term)
}

fn atom(pair: Pair<Rule>) -> Result<Atom> {
    match pair.as_rule() {
        Rule::term => {
            let mut inner = pair.into_inner();
            let function = inner
                .next()
                .map(|function| function.as_str().to_owned())
                .ok_or_else(|| EngineError::Parse {
                    message: "term without a function".to_owned(),
                })?;
            let args = inner.map(atom).collect::<Result<Vec<_>>>()?;
            Ok(Atom::Term { function, args })
        }
        Rule::variable => Ok(Atom::Variable(pair.as_str()[1..].to_owned())),
        Rule::text => {
            let content = pair.into_inner().next().map_or("", |c| c.as_str());
            Ok(Atom::Text(unescape(content)))
        }
        Rule::number => pair
            .as_str()
            .parse()
            .map(Atom::Number)
            .map_err(|e| EngineError::Parse {
                message: format!("{:?} is not a number: {}", pair.as_str(), e),
            }),
        rule => Err(EngineError::Parse {
            message: format!("unexpected {:?}", rule),
        }),
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

// ------------- Compiler -------------
pub struct Compiler<'a> {
    store: &'a Store,
    config: LatticeConfig,
}

impl<'a> Compiler<'a> {
    pub fn new(store: &'a Store, config: LatticeConfig) -> Self {
        Self { store, config }
    }

    pub fn compile(&self, query: &str) -> Result<Box<dyn Term>> {
        self.term(&parse(query)?)
    }

    pub fn term(&self, atom: &Atom) -> Result<Box<dyn Term>> {
        let Atom::Term { function, args } = atom else {
            return Err(compile(format!("expected a term, got {:?}", atom)));
        };
        let store = self.store;
        let config = self.config;
        let term: Box<dyn Term> = match function.as_str() {
            "and" => Box::new(AndTerm::new(config, self.terms(args)?)),
            "or" => Box::new(OrTerm::new(config, self.terms(args)?)),
            "not" => {
                let [inner] = arity::<1>(function, args)?;
                Box::new(NotTerm::new(config, self.term(inner)?))
            }
            "limit" => {
                let [count, inner] = arity::<2>(function, args)?;
                Box::new(LimitTerm::new(config, count_of(count)?, self.term(inner)?))
            }
            "equal" => {
                let [attribute, value] = arity::<2>(function, args)?;
                Box::new(EqualPred::new(
                    store,
                    variable(attribute)?,
                    &literal(value)?,
                    config,
                ))
            }
            "pos" => {
                let [position] = arity::<1>(function, args)?;
                Box::new(PosPred::new(store, count_of(position)?, config))
            }
            "unique" => {
                let [attribute] = arity::<1>(function, args)?;
                Box::new(UniquePred::new(store, variable(attribute)?, config))
            }
            "bundled" => {
                let [] = arity::<0>(function, args)?;
                Box::new(UniquePred::new(store, BOUT_NUMBER, config))
            }
            "unbundled" => self.matcher("unbundled", BOUT_NUMBER, args)?,
            "ns" => self.matcher("ns", NAMESPACE, args)?,
            "author" => self.matcher("author", AUTHOR_NAME, args)?,
            "seen-by" => self.matcher("seen-by", SEEN_BY, args)?,
            "title" => self.matcher("title", BOUT_TITLE, args)?,
            "matches" => {
                let [text] = arity::<1>(function, args)?;
                self.matches(&literal(text)?)
            }
            "number" => {
                let [number] = arity::<1>(function, args)?;
                Box::new(NumberTerm::new(store, msg_of(number)?, config)?)
            }
            "always" => {
                let [] = arity::<0>(function, args)?;
                Box::new(AlwaysTerm::new(store, config))
            }
            "never" => {
                let [] = arity::<0>(function, args)?;
                Box::new(NeverTerm::new(config))
            }
            other => return Err(compile(format!("unknown function {:?}", other))),
        };
        Ok(term)
    }

    fn terms(&self, args: &[Atom]) -> Result<Vec<Box<dyn Term>>> {
        args.iter().map(|arg| self.term(arg)).collect()
    }

    fn matcher(&self, name: &'static str, attribute: &str, args: &[Atom]) -> Result<Box<dyn Term>> {
        let [value] = arity::<1>(name, args)?;
        Ok(Box::new(MatcherTerm::new(
            name,
            self.store,
            attribute,
            &literal(value)?,
            self.config,
        )))
    }

    // one matcher per word, all of them required
    fn matches(&self, text: &str) -> Box<dyn Term> {
        let mut matchers: Vec<Box<dyn Term>> = words(text)
            .iter()
            .map(|word| {
                Box::new(MatcherTerm::new("matches", self.store, TEXT, word, self.config))
                    as Box<dyn Term>
            })
            .collect();
        match matchers.len() {
            0 => Box::new(NeverTerm::new(self.config)),
            1 => matchers.remove(0),
            _ => Box::new(AndTerm::new(self.config, matchers)),
        }
    }
}

fn compile(message: String) -> EngineError {
    EngineError::Compile { message }
}

fn arity<'b, const N: usize>(function: &str, args: &'b [Atom]) -> Result<&'b [Atom; N]> {
    args.try_into().map_err(|_| {
        compile(format!(
            "{} expects {} argument(s), got {}",
            function,
            N,
            args.len()
        ))
    })
}

fn variable(atom: &Atom) -> Result<&str> {
    match atom {
        Atom::Variable(name) => Ok(name),
        other => Err(compile(format!("expected a $variable, got {:?}", other))),
    }
}

fn literal(atom: &Atom) -> Result<String> {
    match atom {
        Atom::Text(text) => Ok(text.clone()),
        Atom::Number(number) => Ok(number.to_string()),
        other => Err(compile(format!("expected a value, got {:?}", other))),
    }
}

fn count_of(atom: &Atom) -> Result<usize> {
    match atom {
        Atom::Number(number) => usize::try_from(*number)
            .map_err(|_| compile(format!("{} is not a valid count", number))),
        other => Err(compile(format!("expected a count, got {:?}", other))),
    }
}

fn msg_of(atom: &Atom) -> Result<Msg> {
    match atom {
        Atom::Number(number) => Msg::try_from(*number)
            .map_err(|_| compile(format!("{} is not a message number", number))),
        other => Err(compile(format!("expected a message number, got {:?}", other))),
    }
}
