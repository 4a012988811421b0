// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The command parser from LambdaMOO 1.8: split the line into words, find the
//! first preposition, and resolve the object phrases on either side of it.

use crate::matching::prepositions::{Preposition, MULTI_WORD_PREPOSITIONS};
use crate::matching::{ObjectNameMatcher, ParseCommandError, ParsedCommand};
use crate::model::PrepSpec;
use crate::util::parse_into_words;
use etamoo_var::{v_str, Symbol, Var};

/// Parse `input` into a [`ParsedCommand`], resolving dobj/iobj phrases via
/// `matcher`.
pub fn parse_command<M: ObjectNameMatcher>(
    input: &str,
    matcher: &M,
) -> Result<ParsedCommand, ParseCommandError> {
    // Replace initial command characters with say/emote/eval.
    let mut command = input.trim_start().to_string();
    let first_char = command.chars().next().unwrap_or(' ');
    match first_char {
        '"' => command.replace_range(..1, "say "),
        ':' => command.replace_range(..1, "emote "),
        ';' => command.replace_range(..1, "eval "),
        _ => {}
    };

    if parse_into_words(&command).is_empty() {
        return Err(ParseCommandError::EmptyCommand);
    }

    // Split into verb and argument string.
    let mut parts = command.splitn(2, ' ');
    let verb = Symbol::mk(parts.next().unwrap_or_default());
    let argstr = parts.next().unwrap_or_default().to_string();

    let words = parse_into_words(&argstr);

    // Find the first preposition, if any.
    let prep_match = seek_preposition(&words);

    let (dobj_words, prepstr, prep, iobj_words) = match prep_match {
        Some((start, width, prep)) => (
            &words[..start],
            words[start..start + width].join(" "),
            PrepSpec::Other(prep),
            &words[start + width..],
        ),
        None => (&words[..], String::new(), PrepSpec::None, &[] as &[String]),
    };

    let dobjstr = dobj_words.join(" ");
    let dobj = if dobjstr.is_empty() {
        None
    } else {
        matcher
            .match_object(&dobjstr)
            .map_err(ParseCommandError::ErrorDuringMatch)?
    };

    let iobjstr = iobj_words.join(" ");
    let iobj = if iobjstr.is_empty() {
        None
    } else {
        matcher
            .match_object(&iobjstr)
            .map_err(ParseCommandError::ErrorDuringMatch)?
    };

    let args: Vec<Var> = words.iter().map(|w| v_str(w)).collect();

    Ok(ParsedCommand {
        verb,
        argstr,
        args,
        dobjstr,
        dobj,
        prepstr,
        prep,
        iobjstr,
        iobj,
    })
}

/// Find the first preposition in the word list, preferring the multi-word
/// forms. Returns (start word index, width in words, preposition).
fn seek_preposition(words: &[String]) -> Option<(usize, usize, Preposition)> {
    for j in 0..words.len() {
        for (phrase, prep) in MULTI_WORD_PREPOSITIONS {
            if words.len() - j >= phrase.len()
                && phrase
                    .iter()
                    .zip(&words[j..])
                    .all(|(p, w)| p.eq_ignore_ascii_case(w))
            {
                return Some((j, phrase.len(), *prep));
            }
        }
        if let Some(prep) = Preposition::parse(words[j].to_lowercase().as_str()) {
            return Some((j, 1, prep));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorldStateError;
    use etamoo_var::{v_str, Obj};

    struct SimpleParseMatcher {}
    impl ObjectNameMatcher for SimpleParseMatcher {
        fn match_object(&self, name: &str) -> Result<Option<Obj>, WorldStateError> {
            Ok(match name {
                "obj" => Some(Obj::mk_id(1)),
                "player" => Some(Obj::mk_id(2)),
                _ => None,
            })
        }
    }

    #[test]
    fn test_parse_single_arg_command() {
        let parsed = parse_command("look obj", &SimpleParseMatcher {}).unwrap();
        assert_eq!(parsed.verb.as_str(), "look");
        assert_eq!(parsed.dobjstr, "obj");
        assert_eq!(parsed.dobj, Some(Obj::mk_id(1)));
        assert_eq!(parsed.prepstr, "");
        assert_eq!(parsed.prep, PrepSpec::None);
        assert_eq!(parsed.iobjstr, "");
        assert_eq!(parsed.iobj, None);
        assert_eq!(parsed.args, vec![v_str("obj")]);
        assert_eq!(parsed.argstr, "obj");
    }

    #[test]
    fn test_parse_dobj_prep_iobj_command() {
        let parsed = parse_command("give obj to player", &SimpleParseMatcher {}).unwrap();
        assert_eq!(parsed.verb.as_str(), "give");
        assert_eq!(parsed.dobj, Some(Obj::mk_id(1)));
        assert_eq!(parsed.prepstr, "to");
        assert_eq!(parsed.prep, PrepSpec::Other(Preposition::AtTo));
        assert_eq!(parsed.iobjstr, "player");
        assert_eq!(parsed.iobj, Some(Obj::mk_id(2)));
        assert_eq!(
            parsed.args,
            vec![v_str("obj"), v_str("to"), v_str("player")]
        );
    }

    #[test]
    fn test_parse_multi_word_preposition() {
        let parsed = parse_command("put obj on top of player", &SimpleParseMatcher {}).unwrap();
        assert_eq!(parsed.prepstr, "on top of");
        assert_eq!(parsed.prep, PrepSpec::Other(Preposition::OnTopOfOn));
        assert_eq!(parsed.iobjstr, "player");
    }

    #[test]
    fn test_parse_say_abbrev_command() {
        let parsed = parse_command("\"hello, world!", &SimpleParseMatcher {}).unwrap();
        assert_eq!(parsed.verb.as_str(), "say");
        assert_eq!(parsed.argstr, "hello, world!");
        assert_eq!(parsed.args, vec![v_str("hello,"), v_str("world!")]);
    }

    #[test]
    fn test_parse_eval_command() {
        let parsed = parse_command(";1 + 1", &SimpleParseMatcher {}).unwrap();
        assert_eq!(parsed.verb.as_str(), "eval");
        assert_eq!(parsed.argstr, "1 + 1");
    }

    #[test]
    fn test_parse_empty_command() {
        assert_eq!(
            parse_command("  ", &SimpleParseMatcher {}),
            Err(ParseCommandError::EmptyCommand)
        );
    }
}
