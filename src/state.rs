use std::fmt;
use std::sync::Arc;

use crate::board::{Board, Color, Vertex, PASS, RESIGN};

/// A full game position: the board plus everything the rules and the
/// network need to remember about how it was reached.
///
/// Cloning is a per-simulation operation: the board snapshots used for the
/// history planes are reference counted, so a clone copies one board and a
/// handful of counters.
#[derive(Clone)]
pub struct GameState {
    pub board: Board,
    to_move: Color,
    move_num: usize,
    passes: u32,
    komove: Vertex,
    last_move: Vertex,
    komi: f32,
    resigned: Color,
    ko_hash_history: Vec<u64>,
    board_history: Vec<Arc<Board>>,
}

impl GameState {
    pub fn new(komi: f32) -> Self {
        let board = Board::new();
        let snapshot = Arc::new(board.clone());
        GameState {
            board,
            to_move: Color::Black,
            move_num: 0,
            passes: 0,
            komove: -1,
            last_move: -1,
            komi,
            resigned: Color::Empty,
            ko_hash_history: vec![snapshot.ko_hash()],
            board_history: vec![snapshot],
        }
    }

    pub fn reset_game(&mut self) {
        let komi = self.komi;
        *self = GameState::new(komi);
    }

    #[inline(always)]
    pub fn to_move(&self) -> Color {
        self.to_move
    }

    pub fn set_to_move(&mut self, color: Color) {
        debug_assert!(color.is_stone());
        self.to_move = color;
    }

    #[inline(always)]
    pub fn move_num(&self) -> usize {
        self.move_num
    }

    #[inline(always)]
    pub fn passes(&self) -> u32 {
        self.passes
    }

    #[inline(always)]
    pub fn last_move(&self) -> Vertex {
        self.last_move
    }

    #[inline(always)]
    pub fn komi(&self) -> f32 {
        self.komi
    }

    pub fn set_komi(&mut self, komi: f32) {
        self.komi = komi;
    }

    pub fn has_resigned(&self) -> bool {
        self.resigned != Color::Empty
    }

    pub fn who_resigned(&self) -> Color {
        self.resigned
    }

    /// Legality under Tromp-Taylor rules: on an empty square, not suicide,
    /// not the simple-ko square, and not recreating any earlier position.
    /// The would-be position is probed without mutating the board, so the
    /// check is safe to run concurrently from many workers.
    pub fn is_move_legal(&self, color: Color, vertex: Vertex) -> bool {
        if vertex == PASS || vertex == RESIGN {
            return true;
        }
        if vertex < 0 || vertex as usize >= crate::board::BOARD_SQ {
            return false;
        }
        if vertex == self.komove {
            return false;
        }
        match self.board.fast_test_move(color, vertex as usize) {
            None => false,
            Some(hash) => !self.ko_hash_history.contains(&hash),
        }
    }

    /// True if the current position already occurred earlier in the game.
    pub fn superko(&self) -> bool {
        let current = self.board.ko_hash();
        self.ko_hash_history[..self.ko_hash_history.len() - 1]
            .iter()
            .any(|&h| h == current)
    }

    /// True if `color` playing `vertex` would recreate a position from the
    /// history. Non-mutating counterpart of playing the move and asking
    /// [`GameState::superko`]. Squares that cannot be played at all (taken,
    /// suicide) report `false`; they are rejected elsewhere.
    pub fn superko_move(&self, color: Color, vertex: Vertex) -> bool {
        debug_assert!(vertex >= 0);
        match self.board.fast_test_move(color, vertex as usize) {
            None => false,
            Some(hash) => self.ko_hash_history.contains(&hash),
        }
    }

    pub fn play_move(&mut self, color: Color, vertex: Vertex) {
        if vertex == RESIGN {
            self.resigned = color;
            return;
        }

        if vertex == PASS {
            self.komove = -1;
            self.passes = (self.passes + 1).min(4);
        } else {
            self.komove = self.board.update_board(color, vertex as usize);
            self.passes = 0;
        }

        self.last_move = vertex;
        self.move_num += 1;
        self.to_move = color.opponent();

        self.ko_hash_history.push(self.board.ko_hash());
        self.board_history.truncate(self.move_num);
        self.board_history.push(Arc::new(self.board.clone()));
    }

    /// Board as it stood `moves_ago` moves back; 0 is the current board.
    pub fn get_past_board(&self, moves_ago: usize) -> &Board {
        debug_assert!(moves_ago <= self.move_num);
        debug_assert!(self.move_num < self.board_history.len());
        &self.board_history[self.move_num - moves_ago]
    }

    pub fn final_score(&self) -> f32 {
        self.board.area_score(self.komi)
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Passes: {}            Black (X) Prisoners: {}",
            self.passes,
            self.board.prisoners(Color::Black)
        )?;
        writeln!(
            f,
            "{} to move    White (O) Prisoners: {}",
            if self.to_move == Color::Black {
                "Black (X)"
            } else {
                "White (O)"
            },
            self.board.prisoners(Color::White)
        )?;
        write!(f, "{}", self.board)
    }
}

////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::text_to_move;

    fn play(state: &mut GameState, coord: &str) {
        let color = state.to_move();
        let v = text_to_move(coord).unwrap();
        assert!(state.is_move_legal(color, v), "{coord} should be legal");
        state.play_move(color, v);
    }

    /// Black and White build the classic four-stone ko around E5/F5;
    /// White takes first. Returns the state with the ko open.
    fn ko_position() -> GameState {
        let mut state = GameState::new(7.5);
        for c in ["D5", "F4", "E4", "F6", "E6", "G5", "F5", "E5"] {
            play(&mut state, c);
        }
        state
    }

    #[test]
    fn passes_accumulate_and_cap() {
        let mut state = GameState::new(7.5);
        assert_eq!(state.passes(), 0);
        for expected in [1, 2, 3, 4, 4] {
            let color = state.to_move();
            state.play_move(color, PASS);
            assert_eq!(state.passes(), expected);
        }
        play(&mut state, "D4");
        assert_eq!(state.passes(), 0);
    }

    #[test]
    fn pass_and_resign_are_always_legal() {
        let state = GameState::new(7.5);
        assert!(state.is_move_legal(Color::Black, PASS));
        assert!(state.is_move_legal(Color::White, PASS));
        assert!(state.is_move_legal(Color::Black, RESIGN));
    }

    #[test]
    fn occupied_square_is_illegal() {
        let mut state = GameState::new(7.5);
        play(&mut state, "Q16");
        assert!(!state.is_move_legal(Color::White, text_to_move("Q16").unwrap()));
    }

    #[test]
    fn simple_ko_recapture_is_illegal() {
        let state = ko_position();
        // White just captured at E5; Black may not take straight back.
        let f5 = text_to_move("F5").unwrap();
        assert!(!state.is_move_legal(Color::Black, f5));
        // A ko threat elsewhere is fine.
        assert!(state.is_move_legal(Color::Black, text_to_move("Q16").unwrap()));
    }

    #[test]
    fn superko_forbids_recreating_the_position() {
        let mut state = ko_position();
        // Black plays a threat, White ignores it, Black retakes the ko.
        play(&mut state, "Q16");
        play(&mut state, "Q4");
        play(&mut state, "F5");
        // The immediate White recapture would exactly recreate the position
        // that stood after White answered the first threat; the hash history
        // rejects it independently of the simple-ko square.
        let e5 = text_to_move("E5").unwrap();
        assert!(!state.is_move_legal(Color::White, e5));
        assert!(state.superko_move(Color::White, e5));
    }

    #[test]
    fn superko_matches_played_out_probe() {
        let mut state = ko_position();
        play(&mut state, "Q16");
        play(&mut state, "Q4");
        play(&mut state, "F5");
        let e5 = text_to_move("E5").unwrap();
        let mut replayed = state.clone();
        replayed.play_move(Color::White, e5);
        assert!(replayed.superko());
        assert_eq!(state.superko_move(Color::White, e5), replayed.superko());
    }

    #[test]
    fn past_boards_walk_backwards() {
        let mut state = GameState::new(7.5);
        let d4 = text_to_move("D4").unwrap() as usize;
        play(&mut state, "D4");
        play(&mut state, "Q16");
        assert_eq!(state.get_past_board(0).square(d4), Color::Black);
        assert_eq!(state.get_past_board(1).square(d4), Color::Black);
        assert_eq!(state.get_past_board(2).square(d4), Color::Empty);
    }

    #[test]
    fn final_score_of_empty_game_is_minus_komi() {
        let mut state = GameState::new(7.5);
        state.play_move(Color::Black, PASS);
        state.play_move(Color::White, PASS);
        assert_eq!(state.final_score(), -7.5);
    }

    #[test]
    fn score_is_indifferent_to_where_passes_land() {
        let moves = ["D4", "Q16", "Q4", "D16", "C3", "E16", "D3"];
        let interleaved = {
            let mut state = GameState::new(7.5);
            for (i, c) in moves.iter().enumerate() {
                // A pass from each side in the middle keeps the colors of
                // the remaining moves unchanged.
                if i == 2 {
                    for _ in 0..2 {
                        let color = state.to_move();
                        state.play_move(color, PASS);
                    }
                }
                let color = state.to_move();
                state.play_move(color, text_to_move(c).unwrap());
            }
            state.final_score()
        };
        let trailing = {
            let mut state = GameState::new(7.5);
            for c in moves {
                let color = state.to_move();
                state.play_move(color, text_to_move(c).unwrap());
            }
            for _ in 0..2 {
                let color = state.to_move();
                state.play_move(color, PASS);
            }
            state.final_score()
        };
        assert_eq!(interleaved, trailing);
    }

    #[test]
    fn display_reports_prisoners_and_turn() {
        let mut state = GameState::new(7.5);
        play(&mut state, "D4");
        let text = format!("{state}");
        assert!(text.contains("White (O) to move"));
        assert!(text.contains("Black (X) Prisoners: 0"));
    }

    #[test]
    fn resign_records_and_freezes() {
        let mut state = GameState::new(7.5);
        play(&mut state, "D4");
        let num = state.move_num();
        state.play_move(Color::White, RESIGN);
        assert!(state.has_resigned());
        assert_eq!(state.who_resigned(), Color::White);
        assert_eq!(state.move_num(), num);
    }
}
