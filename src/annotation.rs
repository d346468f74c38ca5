//! Parsers for the values of `[%clk ...]` and `[%eval ...]` annotations.
//!
//! The movetext parser hands over the raw value text (`0:00:30`, `0.19`,
//! `#-3`); these turn it into seconds and an [`Eval`].

use nom::{
    branch::alt,
    character::complete::{char, digit1, i32 as signed_int},
    combinator::{all_consuming, map, map_res, opt, recognize},
    sequence::preceded,
    IResult, Parser,
};

use crate::eval::Eval;

/// Remaining clock time in seconds, or `None` if the value is malformed.
pub fn parse_clock(value: &str) -> Option<f64> {
    all_consuming(time_value)
        .parse(value.trim())
        .ok()
        .map(|(_, seconds)| seconds)
}

/// Evaluation in pawns (`0.19`, `-1.5`) or mate (`#3`, `#-2`), or `None` if
/// the value is malformed. A trailing search depth (`0.19,20`) is dropped.
pub fn parse_eval(value: &str) -> Option<Eval> {
    all_consuming(eval_value)
        .parse(value.trim())
        .ok()
        .map(|(_, eval)| eval)
}

/// Parser for a time value, `h:mm:ss` with optional fractional seconds
fn time_value(input: &str) -> IResult<&str, f64> {
    map(
        (
            map_res(digit1, |s: &str| s.parse::<u32>()),
            char(':'),
            map_res(digit1, |s: &str| s.parse::<u32>()),
            char(':'),
            map_res(unsigned_decimal, |s: &str| s.parse::<f64>()),
        ),
        |(hours, _, minutes, _, seconds)| {
            f64::from(hours) * 3600.0 + f64::from(minutes) * 60.0 + seconds
        },
    )
    .parse(input)
}

fn eval_value(input: &str) -> IResult<&str, Eval> {
    map((alt((mate, pawns)), opt(preceded(char(','), digit1))), |(eval, _)| eval).parse(input)
}

/// `#n` or `#-n`
fn mate(input: &str) -> IResult<&str, Eval> {
    map(preceded(char('#'), signed_int), Eval::Mate).parse(input)
}

/// Pawn units, stored as rounded centipawns
fn pawns(input: &str) -> IResult<&str, Eval> {
    map(
        map_res(signed_decimal, |s: &str| s.parse::<f64>()),
        |pawns| Eval::Centipawns((pawns * 100.0).round() as i32),
    )
    .parse(input)
}

/// Parser for a signed number
fn signed_decimal(input: &str) -> IResult<&str, &str> {
    recognize((opt(alt((char('+'), char('-')))), unsigned_decimal)).parse(input)
}

fn unsigned_decimal(input: &str) -> IResult<&str, &str> {
    recognize((digit1, opt(preceded(char('.'), digit1)))).parse(input)
}
