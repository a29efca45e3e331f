//! Parsed IF/THEN/ELSE rule

use crate::condition::Condition;
use crate::statement::Branch;
use crate::types::RuleDef;
use firesense_calc::SymbolTable;

/// One rule: the verbatim definition plus its parsed trees
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub def: RuleDef,
    pub condition: Condition,
    pub then_branch: Branch,
    pub else_branch: Branch,
    /// Condition result of the last evaluated tick
    pub last_result: bool,
}

impl Rule {
    /// Parse all three parts against the current channel set
    pub fn parse(def: RuleDef, symbols: &dyn SymbolTable) -> Self {
        let condition = Condition::parse(&def.condition, symbols);
        let then_branch = Branch::parse(&def.then, symbols);
        let else_branch = Branch::parse(&def.otherwise, symbols);
        Self {
            def,
            condition,
            then_branch,
            else_branch,
            last_result: false,
        }
    }

    /// Re-resolve channel references, e.g. after the channel list was rebuilt
    ///
    /// Statement state (delays, iteration counters) starts over.
    pub fn reparse(&mut self, symbols: &dyn SymbolTable) {
        let last_result = self.last_result;
        *self = Rule::parse(self.def.clone(), symbols);
        self.last_result = last_result;
    }
}
