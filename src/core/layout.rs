pub const SPENDING_FLOOR: usize = 0;
pub const SEPP_AMOUNT: usize = 1;
const GLOBAL_SLOTS: usize = 2;

pub const WORK_BLOCK: usize = 4;
pub const HEADROOM_GROUP: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowSlots {
    pub from_savings: usize,
    pub from_ira: usize,
    pub from_roth: usize,
    pub ira_to_roth: usize,
}

impl FlowSlots {
    fn at(base: usize) -> Self {
        Self {
            from_savings: base,
            from_ira: base + 1,
            from_roth: base + 2,
            ira_to_roth: base + 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedSplit {
    pub value: usize,
    pub indicator: usize,
    pub positive: usize,
    pub negative: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinOfTwo {
    pub result: usize,
    pub a: usize,
    pub b: usize,
    pub a_indicator: usize,
    pub b_indicator: usize,
}

/// Nine slots describing how much of one bracket is left for gains after
/// ordinary income has claimed its share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadroomSlots {
    pub value: usize,
    pub indicator: usize,
    pub positive: usize,
    pub negative: usize,
    pub width: usize,
    pub positive_indicator: usize,
    pub width_indicator: usize,
    pub consumed: usize,
    pub gains: usize,
}

impl HeadroomSlots {
    fn at(base: usize) -> Self {
        Self {
            value: base,
            indicator: base + 1,
            positive: base + 2,
            negative: base + 3,
            width: base + 4,
            positive_indicator: base + 5,
            width_indicator: base + 6,
            consumed: base + 7,
            gains: base + 8,
        }
    }

    pub fn split(&self) -> SignedSplit {
        SignedSplit {
            value: self.value,
            indicator: self.indicator,
            positive: self.positive,
            negative: self.negative,
        }
    }

    pub fn min(&self) -> MinOfTwo {
        MinOfTwo {
            result: self.consumed,
            a: self.positive,
            b: self.width,
            a_indicator: self.positive_indicator,
            b_indicator: self.width_indicator,
        }
    }

    pub fn slots(&self) -> [usize; HEADROOM_GROUP] {
        [
            self.value,
            self.indicator,
            self.positive,
            self.negative,
            self.width,
            self.positive_indicator,
            self.width_indicator,
            self.consumed,
            self.gains,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RetirementOffsets {
    standard_deduction: usize,
    federal_brackets: usize,
    state_deduction: usize,
    state_brackets: usize,
    gains_headroom: usize,
    savings_balance: usize,
    ira_balance: usize,
    roth_balance: usize,
    federal_tax: usize,
    state_tax: usize,
    total_tax: usize,
    gains_distribution: usize,
    nii: usize,
    block: usize,
}

impl RetirementOffsets {
    fn compute(federal: usize, state: usize, gains: usize) -> Self {
        let standard_deduction = WORK_BLOCK;
        let federal_brackets = standard_deduction + 1;
        let state_deduction = federal_brackets + federal;
        let state_brackets = state_deduction + 1;
        let gains_headroom = state_brackets + state;
        let savings_balance = gains_headroom + HEADROOM_GROUP * gains;
        let ira_balance = savings_balance + 1;
        let roth_balance = ira_balance + 1;
        let federal_tax = roth_balance + 1;
        let state_tax = federal_tax + 1;
        let total_tax = state_tax + 1;
        let gains_distribution = total_tax + 1;
        let nii = gains_distribution + 1;
        Self {
            standard_deduction,
            federal_brackets,
            state_deduction,
            state_brackets,
            gains_headroom,
            savings_balance,
            ira_balance,
            roth_balance,
            federal_tax,
            state_tax,
            total_tax,
            gains_distribution,
            nii,
            block: nii + HEADROOM_GROUP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableLayout {
    work_years: usize,
    plan_years: usize,
    federal_brackets: usize,
    state_brackets: usize,
    gains_brackets: usize,
    offsets: RetirementOffsets,
    retirement_start: usize,
}

impl VariableLayout {
    pub fn compute(
        work_years: usize,
        plan_years: usize,
        federal_brackets: usize,
        state_brackets: usize,
        gains_brackets: usize,
    ) -> Self {
        Self {
            work_years,
            plan_years,
            federal_brackets,
            state_brackets,
            gains_brackets,
            offsets: RetirementOffsets::compute(federal_brackets, state_brackets, gains_brackets),
            retirement_start: GLOBAL_SLOTS + WORK_BLOCK * work_years,
        }
    }

    pub fn work_years(&self) -> usize {
        self.work_years
    }

    pub fn plan_years(&self) -> usize {
        self.plan_years
    }

    pub fn federal_bracket_count(&self) -> usize {
        self.federal_brackets
    }

    pub fn state_bracket_count(&self) -> usize {
        self.state_brackets
    }

    pub fn gains_bracket_count(&self) -> usize {
        self.gains_brackets
    }

    pub fn retirement_block_size(&self) -> usize {
        self.offsets.block
    }

    pub fn total(&self) -> usize {
        self.retirement_start + self.offsets.block * self.plan_years
    }

    pub fn work_year(&self, year: usize) -> FlowSlots {
        assert!(year < self.work_years, "work year {year} out of range");
        FlowSlots::at(GLOBAL_SLOTS + WORK_BLOCK * year)
    }

    pub fn retirement_year(&self, year: usize) -> RetirementYear<'_> {
        assert!(year < self.plan_years, "retirement year {year} out of range");
        RetirementYear {
            layout: self,
            base: self.retirement_start + self.offsets.block * year,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetirementYear<'a> {
    layout: &'a VariableLayout,
    base: usize,
}

impl RetirementYear<'_> {
    fn slot(&self, offset: usize) -> usize {
        self.base + offset
    }

    pub fn flows(&self) -> FlowSlots {
        FlowSlots::at(self.base)
    }

    pub fn from_savings(&self) -> usize {
        self.flows().from_savings
    }

    pub fn from_ira(&self) -> usize {
        self.flows().from_ira
    }

    pub fn from_roth(&self) -> usize {
        self.flows().from_roth
    }

    pub fn ira_to_roth(&self) -> usize {
        self.flows().ira_to_roth
    }

    pub fn standard_deduction(&self) -> usize {
        self.slot(self.layout.offsets.standard_deduction)
    }

    pub fn federal_bracket(&self, index: usize) -> usize {
        assert!(index < self.layout.federal_brackets);
        self.slot(self.layout.offsets.federal_brackets + index)
    }

    pub fn state_deduction(&self) -> usize {
        self.slot(self.layout.offsets.state_deduction)
    }

    pub fn state_bracket(&self, index: usize) -> usize {
        assert!(index < self.layout.state_brackets);
        self.slot(self.layout.offsets.state_brackets + index)
    }

    pub fn gains_headroom(&self, index: usize) -> HeadroomSlots {
        assert!(index < self.layout.gains_brackets);
        HeadroomSlots::at(self.slot(self.layout.offsets.gains_headroom + HEADROOM_GROUP * index))
    }

    pub fn savings_balance(&self) -> usize {
        self.slot(self.layout.offsets.savings_balance)
    }

    pub fn ira_balance(&self) -> usize {
        self.slot(self.layout.offsets.ira_balance)
    }

    pub fn roth_balance(&self) -> usize {
        self.slot(self.layout.offsets.roth_balance)
    }

    pub fn federal_tax(&self) -> usize {
        self.slot(self.layout.offsets.federal_tax)
    }

    pub fn state_tax(&self) -> usize {
        self.slot(self.layout.offsets.state_tax)
    }

    pub fn total_tax(&self) -> usize {
        self.slot(self.layout.offsets.total_tax)
    }

    pub fn gains_distribution(&self) -> usize {
        self.slot(self.layout.offsets.gains_distribution)
    }

    pub fn nii(&self) -> HeadroomSlots {
        HeadroomSlots::at(self.slot(self.layout.offsets.nii))
    }
}
