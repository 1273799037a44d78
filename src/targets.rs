//! The financial tables a credit review needs out of every prospectus.
//!
//! Each target has a canonical Chinese name (the closed vocabulary offered
//! to the LLM when it types a table) and a disambiguation description used
//! when several tables claim the same type.

use serde::{Deserialize, Serialize};

/// Table type the LLM must use when a table fits none of the targets.
pub const OTHER_TABLE_TYPE: &str = "其他表";

/// One semantic table the pipeline tries to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetTable {
    BalanceSheet,
    IncomeStatement,
    AccountsReceivable,
    OtherReceivables,
    RestrictedAssets,
    InterestBearingDebt,
    CreditLines,
    OperatingRevenue,
    CashFlow,
    ExternalGuarantees,
    GuarantorProfile,
}

impl TargetTable {
    pub const ALL: [TargetTable; 11] = [
        TargetTable::BalanceSheet,
        TargetTable::IncomeStatement,
        TargetTable::AccountsReceivable,
        TargetTable::OtherReceivables,
        TargetTable::RestrictedAssets,
        TargetTable::InterestBearingDebt,
        TargetTable::CreditLines,
        TargetTable::OperatingRevenue,
        TargetTable::CashFlow,
        TargetTable::ExternalGuarantees,
        TargetTable::GuarantorProfile,
    ];

    /// Canonical name; also the key in [`crate::output::TableDataSet`].
    pub fn name(self) -> &'static str {
        match self {
            TargetTable::BalanceSheet => "资产负债表",
            TargetTable::IncomeStatement => "利润表",
            TargetTable::AccountsReceivable => "应收账款",
            TargetTable::OtherReceivables => "其他应收款",
            TargetTable::RestrictedAssets => "受限资产",
            TargetTable::InterestBearingDebt => "有息负债",
            TargetTable::CreditLines => "授信情况",
            TargetTable::OperatingRevenue => "营业收入",
            TargetTable::CashFlow => "现金流",
            TargetTable::ExternalGuarantees => "对外担保",
            TargetTable::GuarantorProfile => "保证人基本情况",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// What distinguishes the right table from look-alikes.
    pub fn description(self) -> &'static str {
        match self {
            TargetTable::BalanceSheet => {
                "资产负债表：取报告期最新的一张（结合表格标题与时间序列判断）；必须是发行人的合并资产负债表，\
同时列示资产类和负债类科目及其合计；时间序列至少包含2个不同时点"
            }
            TargetTable::IncomeStatement => {
                "利润表：取报告期最新的一张；必须是发行人的合并利润表，标题可能出现“利润”“损益”等字样，\
应列示营业总收入、营业利润、利润总额、净利润等科目；时间序列至少包含2个不同时点；\
标题主体若为担保人则排除"
            }
            TargetTable::AccountsReceivable => {
                "应收账款：取报告期最新的一张；标题通常含“应收账款”，同时含“主要”“前五”的优先；\
表头含单位名称（或项目名称）、金额、占比等字段，可能带账龄与款项性质；标题主体若为担保人则排除"
            }
            TargetTable::OtherReceivables => {
                "其他应收款：取报告期最新的一张；表头含债务人（或单位名称）、期末余额（或金额）、占比等字段，\
可能带账龄与款项性质；列示前五名欠款方的优先；标题主体若为担保人则排除"
            }
            TargetTable::RestrictedAssets => {
                "受限资产：取报告期最新的一张；表头含项目、受限金额（或账面价值）、受限原因，可能带占比；\
内容多为货币资金、存货等；相似表中优先选表头列明受限原因的；标题主体若为担保人则排除"
            }
            TargetTable::InterestBearingDebt => {
                "有息负债：取报告期最新的一张；标题可能出现期限结构等表述，重点是一年内到期的债务\
（如“1年以内（含1年）”“1年内到期”）；若按银行贷款、债券融资、非标融资分类，时间序列至少包含2个不同时点；\
相似表中先取时间最新的，再取表头或关键词明确含一年内到期借款的；标题主体若为担保人则排除"
            }
            TargetTable::CreditLines => {
                "授信情况：取报告期最新的一张；表头含银行（授信机构）、授信额度、已使用额度、未使用额度；\
标题主体若为担保人则排除"
            }
            TargetTable::OperatingRevenue => {
                "营业收入：取报告期最新的一张；表头或关键词含业务板块等项目以及各期金额和占比；\
时间序列至少包含2个不同时点；优先选按主营业务板块拆分收入的表，表头或关键词含营业成本的不选；\
标题主体若为担保人则排除"
            }
            TargetTable::CashFlow => {
                "现金流：取报告期最新的一张；必须是发行人的合并现金流量表；时间序列至少包含2个不同时点；\
标题主体若为担保人则排除"
            }
            TargetTable::ExternalGuarantees => {
                "对外担保：取报告期最新的一张；表头含被担保人（方）、担保余额（或金额）、担保期限等；\
标题主体若为担保人则排除"
            }
            TargetTable::GuarantorProfile => {
                "保证人基本情况：标题可能出现保证人（或担保人），关键词含注册地址、法定代表人、注册资本等"
            }
        }
    }
}

/// Closed vocabulary offered to the LLM for table typing.
pub fn table_type_vocabulary(targets: &[TargetTable]) -> Vec<&'static str> {
    targets.iter().map(|t| t.name()).collect()
}
