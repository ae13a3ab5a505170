//! Built-in demo sequence and JSON-lines command scripts.

use std::{error::Error, fs, path::Path};

use dmc_core::utils::{Direction, MotorCommand, MotorId};

/// Sorter wheel calibration runs followed by two eject and sort cycles.
pub fn demo_sequence() -> Vec<MotorCommand> {
    use Direction::{Forward, Reverse};
    use MotorId::{Eject, Sorter};

    let mut commands = Vec::new();
    for _ in 0..5 {
        commands.push(MotorCommand::RotateFor { m: Sorter, d: Forward, s: 30, t: 110 });
        commands.push(MotorCommand::RotateFor { m: Sorter, d: Reverse, s: 30, t: 100 });
    }
    commands.extend([
        MotorCommand::Wait { t: 200 },
        MotorCommand::RotateFor { m: Sorter, d: Forward, s: 15, t: 530 },
        MotorCommand::Wait { t: 200 },
        MotorCommand::RotateFor { m: Sorter, d: Reverse, s: 15, t: 580 },
        MotorCommand::Wait { t: 200 },
        MotorCommand::RotateBy { m: Sorter, d: Forward, s: 20, deg: 180 },
        MotorCommand::Ramp { m: Sorter, d: Reverse, from: 15, to: 40, t: 900 },
        MotorCommand::Brake { m: Sorter },
        MotorCommand::Idle { m: Sorter },
    ]);
    commands.extend(card_eject());
    commands.extend(card_sort(0));
    commands.extend(card_eject());
    commands.extend(card_sort(3));
    commands.extend([
        MotorCommand::Wait { t: 200 },
        MotorCommand::Status { m: Eject },
        MotorCommand::Status { m: Sorter },
    ]);
    commands
}

/// Separate the lowest card from the stack, throw it out and pull the next one back.
pub fn card_eject() -> Vec<MotorCommand> {
    use Direction::{Forward, Reverse};
    use MotorId::Eject;

    vec![
        MotorCommand::Shake { m: Eject, d: Reverse, s: 40, n: 8, f: 50, b: 50 },
        MotorCommand::Shake { m: Eject, d: Reverse, s: 40, n: 24, f: 50, b: 40 },
        // throw out
        MotorCommand::Pulse { m: Eject, d: Reverse, s: 50, t: 270 },
        MotorCommand::Wait { t: 600 },
        // pull back the second lowest card
        MotorCommand::Drive { m: Eject, d: Forward, s: 25 },
        MotorCommand::Wait { t: 100 },
        MotorCommand::Shake { m: Eject, d: Reverse, s: 40, n: 10, f: 60, b: 80 },
        MotorCommand::Pulse { m: Eject, d: Forward, s: 25, t: 500 },
        MotorCommand::Wait { t: 100 },
    ]
}

/// Throw the card on the sorter wheel into `basket` (0..=3).
///
/// Baskets 0 and 1 are reached with a slow push after a small nudge, 2 and 3 with a fast throw.
pub fn card_sort(basket: u8) -> Vec<MotorCommand> {
    use Direction::{Forward, Reverse};
    use MotorId::Sorter;

    if basket & 2 != 0 {
        return vec![
            MotorCommand::Pulse { m: Sorter, d: Forward, s: 63, t: 800 },
            MotorCommand::Wait { t: 100 },
        ];
    }

    let mut commands = Vec::new();
    commands.extend(nudge(Forward, 40, 300));
    commands.extend(nudge(Reverse, 30, 100));
    commands.push(MotorCommand::Pulse { m: Sorter, d: Forward, s: 15, t: 250 });
    commands.push(MotorCommand::Wait { t: 300 });
    // second attempt in case the card stayed on the wheel
    commands.extend(nudge(Reverse, 30, 100));
    commands.push(MotorCommand::Pulse { m: Sorter, d: Forward, s: 15, t: 250 });
    commands.push(MotorCommand::Wait { t: 100 });
    commands
}

/// Short crawl of the sorter wheel at the lowest useful speed, then brake and rest.
fn nudge(
    d: Direction,
    ms: u32,
    rest_ms: u32,
) -> [MotorCommand; 4] {
    let m = MotorId::Sorter;
    [
        MotorCommand::Drive { m, d, s: 7 },
        MotorCommand::Wait { t: ms },
        MotorCommand::Brake { m },
        MotorCommand::Wait { t: rest_ms },
    ]
}

/// Parse one `MotorCommand` per line. Blank lines and `#` comments are skipped.
pub fn load_script(path: &Path) -> Result<Vec<MotorCommand>, Box<dyn Error>> {
    let text = fs::read_to_string(path)?;
    let mut commands = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let command: MotorCommand = serde_json::from_str(line)
            .map_err(|e| format!("line {}: {}", n + 1, e))?;
        commands.push(command);
    }
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_drives_both_motors() {
        let commands = demo_sequence();
        assert!(commands.iter().any(|c| matches!(c, MotorCommand::Shake { m: MotorId::Eject, .. })));
        assert!(commands.iter().any(|c| matches!(c, MotorCommand::RotateBy { m: MotorId::Sorter, .. })));
    }

    #[test]
    fn eject_throws_then_pulls_back() {
        let commands = card_eject();
        let shakes: u16 = commands
            .iter()
            .filter_map(|c| match c {
                MotorCommand::Shake { m: MotorId::Eject, n, .. } => Some(*n),
                _ => None,
            })
            .sum();
        assert_eq!(shakes, 42);
        assert!(commands.contains(&MotorCommand::Pulse {
            m: MotorId::Eject,
            d: Direction::Reverse,
            s: 50,
            t: 270
        }));
        assert_eq!(commands.last(), Some(&MotorCommand::Wait { t: 100 }));
        assert!(commands.iter().all(|c| !matches!(c, MotorCommand::Drive { m: MotorId::Sorter, .. })));
    }

    #[test]
    fn low_baskets_nudge_before_a_slow_push() {
        for basket in [0, 1] {
            let commands = card_sort(basket);
            assert_eq!(
                commands.first(),
                Some(&MotorCommand::Drive { m: MotorId::Sorter, d: Direction::Forward, s: 7 })
            );
            let pushes = commands
                .iter()
                .filter(|c| matches!(c, MotorCommand::Pulse { s: 15, t: 250, .. }))
                .count();
            assert_eq!(pushes, 2);
        }
    }

    #[test]
    fn high_baskets_throw_at_full_speed() {
        for basket in [2, 3] {
            assert_eq!(
                card_sort(basket),
                vec![
                    MotorCommand::Pulse { m: MotorId::Sorter, d: Direction::Forward, s: 63, t: 800 },
                    MotorCommand::Wait { t: 100 },
                ]
            );
        }
    }

    #[test]
    fn script_skips_comments() {
        let path = std::env::temp_dir().join("mock-mcu-script-test.jsonl");
        fs::write(
            &path,
            "# warm up\n{\"mc\":\"drive\",\"m\":\"sorter\",\"d\":\"reverse\",\"s\":25}\n\n{\"mc\":\"brake\",\"m\":\"sorter\"}\n",
        )
        .unwrap();
        let commands = load_script(&path).unwrap();
        assert_eq!(
            commands,
            vec![
                MotorCommand::Drive { m: MotorId::Sorter, d: Direction::Reverse, s: 25 },
                MotorCommand::Brake { m: MotorId::Sorter },
            ]
        );
        let _ = fs::remove_file(&path);
    }
}
